pub(crate) mod config;
pub mod errors;
pub(crate) mod metrics;
pub(crate) mod shutdown;
pub(crate) mod telemetry;
pub mod time;

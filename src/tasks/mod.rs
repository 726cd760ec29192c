pub(crate) mod console;
pub(crate) mod session_runner;

mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use secret::BearerToken;
pub(crate) use types::Settings;

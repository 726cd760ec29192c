use std::env;

use super::types::{ConfigError, Environment};
use crate::proctoring::model::Role;

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_positive_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    let parsed = parse_u64(field, value.clone())?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue { field, value });
    }
    Ok(parsed)
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn parse_role(value: Option<String>) -> Result<Role, ConfigError> {
    match value.as_deref().map(|item| item.to_ascii_lowercase()) {
        None => Ok(Role::Student),
        Some(ref val) if val == "student" => Ok(Role::Student),
        Some(ref val) if val == "author" || val == "teacher" => Ok(Role::Author),
        Some(val) => Err(ConfigError::InvalidValue { field: "PROCTOR_ROLE", value: val }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn parse_environment_variants() {
        assert_eq!(parse_environment(Some("prod".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("production".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("staging".to_string())), Environment::Staging);
        assert_eq!(parse_environment(Some("testing".to_string())), Environment::Test);
        assert_eq!(parse_environment(None), Environment::Development);
    }

    #[test]
    fn parse_role_variants() {
        assert_eq!(parse_role(None).unwrap(), Role::Student);
        assert_eq!(parse_role(Some("Student".to_string())).unwrap(), Role::Student);
        assert_eq!(parse_role(Some("teacher".to_string())).unwrap(), Role::Author);
        assert!(matches!(
            parse_role(Some("proctor".to_string())),
            Err(ConfigError::InvalidValue { field: "PROCTOR_ROLE", .. })
        ));
    }

    #[test]
    fn parse_positive_rejects_zero() {
        assert_eq!(parse_positive_u64("X", "15".to_string()).unwrap(), 15);
        assert!(parse_positive_u64("X", "0".to_string()).is_err());
        assert!(parse_positive_u64("X", "ten".to_string()).is_err());
    }
}

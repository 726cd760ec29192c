use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_environment, parse_positive_u64, parse_role,
};
use super::secret::BearerToken;
use super::types::{
    BackendSettings, BackendUrl, ConfigError, ExamSettings, RuntimeSettings, Settings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("PROCTOR_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("PROCTOR_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let base_url = BackendUrl::parse(env_or_default(
            "PROCTOR_BACKEND_URL",
            "http://localhost:5000/api",
        ))?;
        let token = BearerToken::new(env_or_default("PROCTOR_TOKEN", ""));
        let request_timeout_seconds = parse_positive_u64(
            "PROCTOR_HTTP_TIMEOUT_SECONDS",
            env_or_default("PROCTOR_HTTP_TIMEOUT_SECONDS", "30"),
        )?;
        let connect_timeout_seconds = parse_positive_u64(
            "PROCTOR_CONNECT_TIMEOUT_SECONDS",
            env_or_default("PROCTOR_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;

        let exam_id = env_or_default("PROCTOR_EXAM_ID", "");
        let role = parse_role(env_optional("PROCTOR_ROLE"))?;

        let log_level = env_or_default("PROCTOR_LOG_LEVEL", "info");
        let json = env_optional("PROCTOR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            backend: BackendSettings {
                base_url,
                token,
                request_timeout_seconds,
                connect_timeout_seconds,
            },
            exam: ExamSettings { exam_id, role },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn backend(&self) -> &BackendSettings {
        &self.backend
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.exam_id.is_empty() {
            return Err(ConfigError::MissingSetting("PROCTOR_EXAM_ID"));
        }
        if self.exam.exam_id.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "PROCTOR_EXAM_ID",
                value: self.exam.exam_id.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.backend.token.is_empty() {
            return Err(ConfigError::MissingSecret("PROCTOR_TOKEN"));
        }

        if !self.backend.base_url.as_str().starts_with("https://") {
            return Err(ConfigError::InvalidBackendUrl(self.backend.base_url.as_str().to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::types::Environment;
    use crate::proctoring::model::Role;
    use crate::test_support::env_lock;

    const KEYS: &[&str] = &[
        "PROCTOR_ENV",
        "ENVIRONMENT",
        "PROCTOR_STRICT_CONFIG",
        "PROCTOR_BACKEND_URL",
        "PROCTOR_TOKEN",
        "PROCTOR_HTTP_TIMEOUT_SECONDS",
        "PROCTOR_CONNECT_TIMEOUT_SECONDS",
        "PROCTOR_EXAM_ID",
        "PROCTOR_ROLE",
        "PROCTOR_LOG_LEVEL",
        "PROCTOR_LOG_JSON",
        "PROMETHEUS_ENABLED",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_in_development() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("PROCTOR_EXAM_ID", "exam-42");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.runtime().environment, Environment::Development);
        assert_eq!(settings.backend().base_url.as_str(), "http://localhost:5000/api");
        assert_eq!(settings.backend().request_timeout_seconds, 30);
        assert_eq!(settings.exam().role, Role::Student);
        assert_eq!(settings.telemetry().log_level, "info");
        assert!(!settings.telemetry().json);
        clear_env();
    }

    #[test]
    fn load_trims_trailing_slash_from_backend_url() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("PROCTOR_EXAM_ID", "exam-42");
        std::env::set_var("PROCTOR_BACKEND_URL", "https://exams.example.com/api/");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.backend().base_url.as_str(), "https://exams.example.com/api");
        clear_env();
    }

    #[test]
    fn load_requires_exam_id() {
        let _guard = env_lock();
        clear_env();

        let err = Settings::load().expect_err("missing exam id");
        assert!(matches!(err, ConfigError::MissingSetting("PROCTOR_EXAM_ID")));
    }

    #[test]
    fn production_requires_token() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("PROCTOR_EXAM_ID", "exam-42");
        std::env::set_var("PROCTOR_ENV", "production");
        std::env::set_var("PROCTOR_BACKEND_URL", "https://exams.example.com/api");

        let err = Settings::load().expect_err("missing token");
        assert!(matches!(err, ConfigError::MissingSecret("PROCTOR_TOKEN")));

        std::env::set_var("PROCTOR_TOKEN", "secret-token");
        let settings = Settings::load().expect("settings");
        assert!(settings.runtime().strict_config);
        assert_eq!(settings.backend().token.expose(), "secret-token");
        clear_env();
    }

    #[test]
    fn strict_mode_rejects_plain_http_backend() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("PROCTOR_EXAM_ID", "exam-42");
        std::env::set_var("PROCTOR_STRICT_CONFIG", "1");
        std::env::set_var("PROCTOR_TOKEN", "secret-token");

        let err = Settings::load().expect_err("plain http");
        assert!(matches!(err, ConfigError::InvalidBackendUrl(_)));
        clear_env();
    }

    #[test]
    fn invalid_backend_url_is_rejected() {
        let _guard = env_lock();
        clear_env();
        std::env::set_var("PROCTOR_EXAM_ID", "exam-42");
        std::env::set_var("PROCTOR_BACKEND_URL", "ftp://exams");

        let err = Settings::load().expect_err("bad url");
        assert!(matches!(err, ConfigError::InvalidBackendUrl(_)));
        clear_env();
    }
}

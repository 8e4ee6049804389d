//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0) and the authority URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RemoteSettings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted, both at startup and on hot reload

use std::fmt;

use crate::remote::settings::RemoteSettings;

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate remote synchronisation settings.
pub fn validate_settings(settings: &RemoteSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.application_name.trim().is_empty() {
        errors.push(ValidationError::new("application_name", "must not be empty"));
    }
    if settings.timeout_ms == 0 {
        errors.push(ValidationError::new("timeout_ms", "must be greater than zero"));
    }
    if settings.read_write_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "read_write_timeout_ms",
            "must be greater than zero",
        ));
    }
    if settings.timer_interval_ms == 0 {
        errors.push(ValidationError::new(
            "timer_interval_ms",
            "must be greater than zero",
        ));
    }

    // An unreachable URL is tolerated; an unparseable one is not.
    if settings.check_remote_config {
        match url::Url::parse(&settings.remote_configuration_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                "remote_configuration_url",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "remote_configuration_url",
                e.to_string(),
            )),
        }
    }

    if let Some(folder) = &settings.local_configuration_folder {
        if folder.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "local_configuration_folder",
                "must not be empty when set",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = RemoteSettings::default();
        assert_eq!(validate_settings(&settings), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let settings = RemoteSettings {
            timer_interval_ms: 0,
            timeout_ms: 0,
            remote_configuration_url: "not a url".into(),
            ..RemoteSettings::default()
        };

        let errors = validate_settings(&settings).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["timeout_ms", "timer_interval_ms", "remote_configuration_url"]
        );
    }

    #[test]
    fn test_url_ignored_when_polling_disabled() {
        let settings = RemoteSettings {
            check_remote_config: false,
            remote_configuration_url: String::new(),
            ..RemoteSettings::default()
        };
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let settings = RemoteSettings {
            remote_configuration_url: "ftp://config.example/poll".into(),
            ..RemoteSettings::default()
        };
        let errors = validate_settings(&settings).unwrap_err();
        assert!(errors[0].message.contains("ftp"));
    }
}

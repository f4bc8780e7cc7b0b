//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, LogOutput, LoggingConfig, SourceConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_source_config(&config.sources)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: {target:?}"
        )));
    }

    Ok(())
}

fn validate_source_config(sources: &SourceConfig) -> ConfigResult<()> {
    if sources.thread_prefix.is_empty() {
        return Err(ConfigError::missing_field("sources.thread_prefix"));
    }

    if sources.thread_prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(
            "sources.thread_prefix cannot contain whitespace",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some(PathBuf::from("logs/courier.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_max_files_rejected() {
        let mut config = CourierConfig::default();
        config.logging.max_files = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_filter_target_rejected() {
        let mut config = CourierConfig::default();
        config.logging.filters.insert(" ".to_string(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_thread_prefix_rules() {
        let mut config = CourierConfig::default();
        config.sources.thread_prefix = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.sources.thread_prefix = "event feed".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}

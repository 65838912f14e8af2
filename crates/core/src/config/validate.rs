use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - base_dir is not empty
/// - at least one organisation kind is selected for extraction
/// - rate limit window and pause are non-zero
/// - queue allows at least one attempt
/// - the artifact delimiter is a single ASCII character
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.base_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "base_dir cannot be empty".to_string(),
        ));
    }

    if !config.extraction.include_institutions && !config.extraction.include_daycare {
        return Err(ConfigError::ValidationError(
            "extraction must include institutions, daycare facilities or both".to_string(),
        ));
    }

    if config.extraction.fetch_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "extraction.fetch_attempts cannot be 0".to_string(),
        ));
    }

    if config.rate_limit.calls_per_window == 0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.calls_per_window cannot be 0".to_string(),
        ));
    }

    if config.queue.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_attempts cannot be 0".to_string(),
        ));
    }

    if !config.overview.delimiter.is_ascii() || config.overview.delimiter.is_ascii_alphanumeric() {
        return Err(ConfigError::ValidationError(format!(
            "overview.delimiter must be an ASCII separator, got {:?}",
            config.overview.delimiter
        )));
    }

    if config.queue.name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.name cannot be empty".to_string(),
        ));
    }

    Ok(())
}

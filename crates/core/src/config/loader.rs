use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("DATAAFTALER_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
base_dir = "/robot/dataaftaler"

[registry]
session_cookie = "SESSION=abc"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.base_dir.to_str().unwrap(), "/robot/dataaftaler");
        assert_eq!(config.registry.session_cookie, "SESSION=abc");
    }

    #[test]
    fn test_load_config_from_str_missing_base_dir() {
        let toml = r#"
[registry]
session_cookie = "SESSION=abc"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
base_dir = "/data"
notification_mail = "robot@aarhus.dk"

[rate_limit]
calls_per_window = 50
pause_secs = 5

[queue]
max_attempts = 5
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.rate_limit.calls_per_window, 50);
        assert_eq!(config.rate_limit.pause_secs, 5);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.notification_mail.as_deref(), Some("robot@aarhus.dk"));
    }
}

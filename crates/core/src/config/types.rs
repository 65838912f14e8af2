use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base directory for all artifacts (`Output/` lives below it).
    pub base_dir: PathBuf,
    /// Address that receives stage failure notifications.
    #[serde(default)]
    pub notification_mail: Option<String>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub overview: OverviewConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Configuration with every section at its default.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            notification_mail: None,
            registry: RegistryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            extraction: ExtractionConfig::default(),
            overview: OverviewConfig::default(),
            queue: QueueConfig::default(),
        }
    }

    /// Directory holding the overview artifact and error log.
    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join("Output")
    }
}

/// Registry portal connection.
///
/// The cookie and XSRF token are produced by the attended login and handed
/// over as-is; nothing here performs authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Full `Cookie` header value of the logged-in browser session.
    #[serde(default)]
    pub session_cookie: String,
    #[serde(default)]
    pub xsrf_token: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            session_cookie: String::new(),
            xsrf_token: None,
        }
    }
}

fn default_base_url() -> String {
    "https://tilslutning.stil.dk".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Call-count rate limiting shared by every component talking to the registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_calls_per_window")]
    pub calls_per_window: u64,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_window: default_calls_per_window(),
            pause_secs: default_pause_secs(),
        }
    }
}

fn default_calls_per_window() -> u64 {
    200
}

fn default_pause_secs() -> u64 {
    30
}

/// Which organisations the overview run visits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub include_institutions: bool,
    #[serde(default = "default_true")]
    pub include_daycare: bool,
    /// Tries per institution before it is skipped.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            include_institutions: true,
            include_daycare: true,
            fetch_attempts: default_fetch_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_fetch_attempts() -> u32 {
    3
}

/// Overview artifact layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverviewConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> char {
    ';'
}

/// Work queue storage and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Keep the handle stage running until scheduled retries are due.
    #[serde(default = "default_true")]
    pub wait_for_retries: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            name: default_queue_name(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            wait_for_retries: true,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dataaftaler.db")
}

fn default_queue_name() -> String {
    "Databehandlingsaftale_Status_Queue".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

/// Sanitized config for logging (session secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub base_dir: PathBuf,
    pub notification_mail_configured: bool,
    pub registry: SanitizedRegistryConfig,
    pub rate_limit: RateLimitConfig,
    pub extraction: ExtractionConfig,
    pub overview: OverviewConfig,
    pub queue: QueueConfig,
}

/// Sanitized registry config (cookie and token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRegistryConfig {
    pub base_url: String,
    pub timeout_secs: u32,
    pub session_cookie_configured: bool,
    pub xsrf_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            notification_mail_configured: config.notification_mail.is_some(),
            registry: SanitizedRegistryConfig {
                base_url: config.registry.base_url.clone(),
                timeout_secs: config.registry.timeout_secs,
                session_cookie_configured: !config.registry.session_cookie.is_empty(),
                xsrf_token_configured: config
                    .registry
                    .xsrf_token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
            },
            rate_limit: config.rate_limit.clone(),
            extraction: config.extraction.clone(),
            overview: config.overview.clone(),
            queue: config.queue.clone(),
        }
    }
}

pub mod config;
pub mod metrics;
pub mod notify;
pub mod overview;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod testing;
pub mod upload;
pub mod workflow;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use notify::{Notification, Notifier, NotifyError, TracingNotifier};
pub use overview::{OverviewArtifacts, OverviewError};
pub use processor::{ProcessorError, ProcessorSummary};
pub use queue::{QueueError, SqliteWorkQueue, WorkQueue};
pub use registry::{RateLimiter, RegistryError, RegistrySession, StilRegistryClient};
pub use upload::{UploadError, UploadReport};
pub use workflow::{create_overview, handle_queue, open_queue, upload_queue, OverviewOutcome};

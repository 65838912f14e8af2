//! Queue processor for the handle-queue stage.
//!
//! This module provides the `QueueProcessor` which drains the work queue:
//! - Recovery: elements a killed run left in progress are handed back
//! - Processing: each claimed element's status change is applied to the registry
//! - Retry: recoverable failures are rescheduled until attempts run out
//!
//! # Example
//!
//! ```ignore
//! use dataaftaler_core::processor::{ProcessorConfig, QueueProcessor};
//!
//! let processor = QueueProcessor::new(ProcessorConfig::default(), session, queue);
//! let summary = processor.run().await?;
//! println!("{} done, {} failed", summary.succeeded, summary.failures.len());
//! ```

mod config;
mod runner;
mod types;

pub use config::ProcessorConfig;
pub use runner::QueueProcessor;
pub use types::{ElementFailure, ProcessorError, ProcessorSummary};

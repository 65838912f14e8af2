//! Durable work queue handing status changes from the upload stage to the
//! handle stage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteWorkQueue;
pub use store::{QueueError, QueueFilter, WorkQueue};
pub use types::{
    ElementData, Failure, InvalidTransition, NewQueueElement, PushOutcome, QueueElement,
    QueueEvent, QueueState, RetryPolicy,
};

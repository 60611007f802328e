// Domain Layer - Pure types: queue configuration and upstream failures

pub mod error;
pub mod queue;
pub mod request_error;
pub mod retry_after;

// Re-exports
pub use error::DomainError;
pub use queue::{QueueConfig, QueueId, QueueSnapshot};
pub use request_error::{ErrorClass, RequestError};

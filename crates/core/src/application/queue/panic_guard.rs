// Panic isolation for the drain loop
use super::work_item::WorkItem;
use crate::domain::RequestError;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Run one attempt, turning a panic into `RequestError::Panicked`
///
/// A panicking operation must not take the drain task down with it,
/// otherwise `is_processing` stays set and the queue stalls forever.
pub(crate) async fn attempt_guarded(item: &mut dyn WorkItem) -> Result<(), RequestError> {
    match AssertUnwindSafe(item.attempt()).catch_unwind().await {
        Ok(result) => result,
        Err(panic_info) => {
            let panic_msg = panic_message(panic_info.as_ref());
            error!(panic_msg = %panic_msg, "Queued operation panicked");
            Err(RequestError::Panicked(panic_msg))
        }
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

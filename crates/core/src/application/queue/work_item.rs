// Type-erased work items held by the queue

use crate::domain::RequestError;
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::oneshot;

/// A submitted operation plus the channel its submitter awaits
///
/// The queue only needs to run attempts and, on terminal failure, reject.
/// Success is delivered from inside `attempt` so the result type never
/// leaks into the queue.
#[async_trait]
pub(crate) trait WorkItem: Send {
    /// Run the operation once; on success the submitter is resolved
    async fn attempt(&mut self) -> Result<(), RequestError>;

    /// Settle the submitter with a terminal failure
    fn reject(self: Box<Self>, error: RequestError);
}

pub(crate) struct Submission<F, T> {
    operation: F,
    reply: Option<oneshot::Sender<Result<T, RequestError>>>,
}

impl<F, T> Submission<F, T> {
    pub(crate) fn new(operation: F, reply: oneshot::Sender<Result<T, RequestError>>) -> Self {
        Self {
            operation,
            reply: Some(reply),
        }
    }
}

#[async_trait]
impl<F, Fut, T> WorkItem for Submission<F, T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    T: Send + 'static,
{
    async fn attempt(&mut self) -> Result<(), RequestError> {
        let value = (self.operation)().await?;
        if let Some(reply) = self.reply.take() {
            // Submitter may have stopped waiting
            let _ = reply.send(Ok(value));
        }
        Ok(())
    }

    fn reject(mut self: Box<Self>, error: RequestError) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Err(error));
        }
    }
}

use async_trait::async_trait;
use nodeflow_types::RunRequest;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{GraphError, Result};

/// Hand-off point between whoever submits runs and whoever executes them.
///
/// Delivery is at most once; redelivery is the dispatcher's business.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, request: RunRequest) -> Result<()>;

    /// Wait up to `timeout` for a request. `Ok(None)` means nothing arrived in time.
    async fn try_take(&self, timeout: Duration, cancel: &CancellationToken) -> Result<Option<RunRequest>>;
}

/// Channel-backed queue for embedding in a single process
pub struct InMemoryQueue {
    tx: mpsc::Sender<RunRequest>,
    rx: Mutex<mpsc::Receiver<RunRequest>>,
}

impl InMemoryQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { tx, rx: Mutex::new(rx) }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn publish(&self, request: RunRequest) -> Result<()> {
        tracing::debug!(execution_id = %request.execution_id, "Publishing run request");
        self.tx.send(request).await.map_err(|_| GraphError::QueueClosed)
    }

    async fn try_take(&self, timeout: Duration, cancel: &CancellationToken) -> Result<Option<RunRequest>> {
        // One deadline covers both waiting for the receiver and waiting for a request
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            _ = &mut deadline => return Ok(None),
            rx = self.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GraphError::Cancelled),
            _ = &mut deadline => Ok(None),
            request = rx.recv() => request.map(Some).ok_or(GraphError::QueueClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publish_then_take() {
        let queue = InMemoryQueue::new(4);
        let request = RunRequest::from_user_message("hello").with_execution_id("job-1");
        queue.publish(request.clone()).await.unwrap();

        let taken = queue
            .try_take(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(taken, Some(request));
    }

    #[tokio::test]
    async fn test_take_times_out_empty() {
        let queue = InMemoryQueue::default();
        let taken = queue
            .try_take(Duration::from_millis(20), &CancellationToken::new())
            .await
            .unwrap();
        assert!(taken.is_none());
    }

    #[tokio::test]
    async fn test_waiting_taker_keeps_its_own_deadline() {
        let queue = Arc::new(InMemoryQueue::default());

        // First taker holds the receiver for a long wait
        let holder = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .try_take(Duration::from_secs(30), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let taken = tokio::time::timeout(
            Duration::from_secs(2),
            queue.try_take(Duration::from_millis(20), &CancellationToken::new()),
        )
        .await
        .expect("second taker overran its deadline")
        .unwrap();
        assert!(taken.is_none());

        holder.abort();
    }

    #[tokio::test]
    async fn test_take_observes_cancellation() {
        let queue = InMemoryQueue::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = queue.try_take(Duration::from_secs(10), &cancel).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }
}

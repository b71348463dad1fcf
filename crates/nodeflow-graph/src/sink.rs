use nodeflow_llm::StreamItem;
use nodeflow_types::RunEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{GraphError, Result};

pub type EventSender = mpsc::Sender<RunEvent>;

/// Shared destination for everything a run reports
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: EventSender,
}

impl EventSink {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving half, with the given buffer
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Deliver an event, giving up if `cancel` fires while the channel is full
    pub async fn emit(&self, event: RunEvent, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GraphError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| GraphError::SinkClosed),
        }
    }

    /// Forward one provider item on behalf of a node
    pub async fn emit_item(
        &self,
        node_id: &str,
        item: StreamItem,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.emit(
            RunEvent::Stream {
                node_id: node_id.to_string(),
                item,
            },
            cancel,
        )
        .await
    }

    /// Deliver a lifecycle event regardless of cancellation
    pub async fn send(&self, event: RunEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| GraphError::SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_types::RunStatus;

    fn run_end() -> RunEvent {
        RunEvent::RunEnd {
            execution_id: "e".to_string(),
            status: RunStatus::Success,
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_emit_delivers() {
        let (sink, mut rx) = EventSink::channel(4);
        sink.emit(run_end(), &CancellationToken::new()).await.unwrap();

        assert!(rx.recv().await.unwrap().is_run_end());
    }

    #[tokio::test]
    async fn test_emit_on_full_channel_observes_cancellation() {
        let (sink, _rx) = EventSink::channel(1);
        let cancel = CancellationToken::new();
        sink.emit(run_end(), &cancel).await.unwrap();

        cancel.cancel();
        let result = sink.emit(run_end(), &cancel).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
    }

    #[tokio::test]
    async fn test_closed_receiver() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);

        assert!(sink.is_closed());
        assert!(matches!(sink.send(run_end()).await, Err(GraphError::SinkClosed)));
    }
}

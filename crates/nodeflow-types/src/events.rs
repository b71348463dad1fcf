use chrono::{DateTime, Utc};
use nodeflow_llm::StreamItem;
use serde::{Deserialize, Serialize};

use crate::node::NodeType;
use crate::result::NodeResult;

/// Final state of a graph run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// At least one node produced an exception result
    Failed,
    Cancelled,
}

/// Everything a run reports to its sink: graph lifecycle, node lifecycle and
/// forwarded provider stream items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStart {
        execution_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        graph_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    NodeStart {
        /// Repeated by the matching `NodeEnd`
        event_id: String,
        node_id: String,
        node_name: String,
        node_type: NodeType,
        execution_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Provider output forwarded from a Model node as it arrives
    Stream {
        node_id: String,
        item: StreamItem,
    },

    NodeEnd {
        event_id: String,
        node_id: String,
        node_name: String,
        node_type: NodeType,
        execution_id: String,
        result: NodeResult,
        duration_ms: u64,
    },

    RunEnd {
        execution_id: String,
        status: RunStatus,
        duration_ms: u64,
    },
}

impl RunEvent {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStart { node_id, .. }
            | Self::Stream { node_id, .. }
            | Self::NodeEnd { node_id, .. } => Some(node_id),
            Self::RunStart { .. } | Self::RunEnd { .. } => None,
        }
    }

    pub fn is_run_end(&self) -> bool {
        matches!(self, Self::RunEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_llm::StreamItemKind;

    #[test]
    fn test_stream_event_nests_item() {
        let event = RunEvent::Stream {
            node_id: "model-1".to_string(),
            item: StreamItem {
                chat_id: "c".to_string(),
                execution_id: "e".to_string(),
                kind: StreamItemKind::ChatEnd {},
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stream");
        assert_eq!(json["item"]["type"], "chat_end");
        assert_eq!(event.node_id(), Some("model-1"));
    }

    #[test]
    fn test_run_end_serialization() {
        let event = RunEvent::RunEnd {
            execution_id: "e".to_string(),
            status: RunStatus::Cancelled,
            duration_ms: 12,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert!(event.is_run_end());
        assert_eq!(event.node_id(), None);
    }
}

use nodeflow_llm::{Message, ProviderType};
use serde::{Deserialize, Serialize};

use crate::node::NodeType;

/// Message recorded for a node whose dependency failed
pub const PREVIOUS_NODE_FAILED: &str = "An error occurred in a previous node.";

/// Typed outcome of one node execution.
///
/// Every variant linearizes to text via [`NodeResult::text`], which is what
/// downstream nodes consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeResult {
    Input(InputNodeResult),
    Model(ModelNodeResult),
    Output(OutputNodeResult),
    StringFormatter(StringFormatterNodeResult),
    Exception(ExceptionNodeResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputNodeResult {
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNodeResult {
    pub text: String,
    pub provider: ProviderType,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub tool_calls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputNodeResult {
    pub results: Vec<NodeResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringFormatterNodeResult {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionNodeResult {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExceptionNodeResult {
    pub fn new(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            message: message.into(),
            error,
        }
    }

    /// Short-circuit result for a node with a failed dependency
    pub fn previous_node_failed() -> Self {
        Self::new(PREVIOUS_NODE_FAILED, None)
    }
}

impl NodeResult {
    pub fn text(&self) -> String {
        match self {
            Self::Input(r) => r.message.content.clone(),
            Self::Model(r) => r.text.clone(),
            Self::Output(r) => r
                .results
                .iter()
                .map(NodeResult::text)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::StringFormatter(r) => r.text.clone(),
            Self::Exception(r) => r.message.clone(),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception(_))
    }

    pub fn exception(message: impl Into<String>, error: Option<String>) -> Self {
        Self::Exception(ExceptionNodeResult::new(message, error))
    }

    /// Kind of node that produces this result (`None` for exceptions)
    pub fn node_type(&self) -> Option<NodeType> {
        match self {
            Self::Input(_) => Some(NodeType::Input),
            Self::Model(_) => Some(NodeType::Model),
            Self::Output(_) => Some(NodeType::Output),
            Self::StringFormatter(_) => Some(NodeType::StringFormatter),
            Self::Exception(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_projection() {
        let input = NodeResult::Input(InputNodeResult {
            message: Message::user("What is 2+2?"),
        });
        let formatted = NodeResult::StringFormatter(StringFormatterNodeResult {
            text: "Answer briefly.".to_string(),
        });
        let output = NodeResult::Output(OutputNodeResult {
            results: vec![input.clone(), formatted.clone()],
        });

        assert_eq!(input.text(), "What is 2+2?");
        assert_eq!(output.text(), "What is 2+2?\nAnswer briefly.");
        assert_eq!(
            NodeResult::Exception(ExceptionNodeResult::previous_node_failed()).text(),
            PREVIOUS_NODE_FAILED
        );
    }

    #[test]
    fn test_results_serialize_with_type_tag() {
        let result = NodeResult::exception("Model call failed", Some("timeout".to_string()));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"type": "exception", "message": "Model call failed", "error": "timeout"})
        );
        assert!(result.is_exception());
        assert_eq!(result.node_type(), None);
    }
}

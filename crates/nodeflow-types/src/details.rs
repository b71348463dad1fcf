use chrono::{DateTime, Utc};
use nodeflow_llm::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Inbound conversation for a run; the last message is the one being answered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDetails {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl InputDetails {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn from_message(message: Message) -> Self {
        Self::new(vec![message])
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Every message before the latest one
    pub fn history(&self) -> &[Message] {
        match self.messages.split_last() {
            Some((_, history)) => history,
            None => &[],
        }
    }
}

/// Run-level metadata, exposed to templates as `execution.*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExecutionDetails {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            graph_id: None,
            started_at: Utc::now(),
            metadata: Map::new(),
        }
    }
}

/// Everything needed to start one graph run.
///
/// Serializable so it can travel through a job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub execution_id: String,
    pub input: InputDetails,
    /// Prompt table, keyed by prompt id
    #[serde(default)]
    pub prompts: HashMap<String, String>,
    /// Scopes granted to the caller
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RunRequest {
    pub fn new(input: InputDetails) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            input,
            prompts: HashMap::new(),
            scopes: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn from_user_message(content: impl Into<String>) -> Self {
        Self::new(InputDetails::from_message(Message::user(content)))
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn with_prompt(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.prompts.insert(id.into(), text.into());
        self
    }

    pub fn with_prompts(mut self, prompts: HashMap<String, String>) -> Self {
        self.prompts.extend(prompts);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn execution_details(&self) -> ExecutionDetails {
        ExecutionDetails {
            metadata: self.metadata.clone(),
            ..ExecutionDetails::new(self.execution_id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_and_history() {
        let input = InputDetails::new(vec![
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::user("2+2?"),
        ]);

        assert_eq!(input.latest().unwrap().content, "2+2?");
        assert_eq!(input.history().len(), 2);
        assert!(InputDetails::default().history().is_empty());
        assert!(InputDetails::default().latest().is_none());
    }

    #[test]
    fn test_run_request_builders() {
        let request = RunRequest::from_user_message("hello")
            .with_execution_id("exec-1")
            .with_prompt("system", "Be helpful")
            .with_scope("drive.read")
            .with_metadata("tenant", "acme");

        let details = request.execution_details();
        assert_eq!(details.execution_id, "exec-1");
        assert_eq!(details.metadata["tenant"], "acme");
        assert_eq!(request.prompts["system"], "Be helpful");
        assert_eq!(request.scopes, vec!["drive.read"]);
    }
}

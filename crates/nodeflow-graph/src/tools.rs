use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use nodeflow_llm::{ToolCallback, ToolDefinition};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A callable offered to models.
///
/// Implementations wrap external services and receive arguments that have
/// already been checked against their schema's `required` list.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Scopes the caller must hold for this tool to be offered
    fn required_scopes(&self) -> Vec<String> {
        Vec::new()
    }

    async fn call(&self, arguments: Value) -> Result<Value>;
}

type ToolFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Tool backed by a closure
pub struct FunctionTool {
    definition: ToolDefinition,
    scopes: Vec<String>,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    pub fn new<F, Fut>(definition: ToolDefinition, func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            definition,
            scopes: Vec::new(),
            func: Arc::new(move |args| -> BoxFuture<'static, Result<Value>> { Box::pin(func(args)) }),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn required_scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        (self.func)(arguments).await
    }
}

/// Scopes granted to the caller of a run
#[derive(Debug, Clone, Default)]
pub struct Posture {
    scopes: HashSet<String>,
}

impl Posture {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn grants(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn allows(&self, tool: &dyn Tool) -> bool {
        tool.required_scopes().iter().all(|scope| self.grants(scope))
    }
}

/// Arguments must be an object carrying every property the schema requires
pub fn validate_arguments(definition: &ToolDefinition, arguments: &Value) -> Result<()> {
    let Some(object) = arguments.as_object() else {
        bail!("Arguments for '{}' must be a JSON object", definition.name);
    };

    let missing: Vec<&str> = definition
        .required_properties()
        .into_iter()
        .filter(|name| !object.contains_key(*name))
        .collect();

    if !missing.is_empty() {
        bail!(
            "Missing required argument(s) for '{}': {}",
            definition.name,
            missing.join(", ")
        );
    }
    Ok(())
}

/// Every tool known to the process, by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice; keeping the latest");
        }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// The listed tools that exist and are allowed under `posture`, in list order
    pub fn permitted(&self, names: &[String], posture: &Posture) -> ToolSet {
        let mut tools = Vec::new();

        for name in names {
            match self.tools.get(name) {
                Some(tool) if posture.allows(tool.as_ref()) => tools.push(Arc::clone(tool)),
                Some(_) => tracing::debug!(tool = %name, "Tool withheld: missing scope"),
                None => tracing::warn!(tool = %name, "Configured tool is not registered"),
            }
        }

        ToolSet { tools }
    }
}

/// Tools offered to one Model node invocation
#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    fn find(&self, name: &str) -> Option<(&Arc<dyn Tool>, ToolDefinition)> {
        self.tools.iter().find_map(|tool| {
            let definition = tool.definition();
            (definition.name == name).then_some((tool, definition))
        })
    }
}

#[async_trait]
impl ToolCallback for ToolSet {
    async fn call(&self, name: &str, arguments: Value, tool_call_id: &str) -> Result<Value> {
        let Some((tool, definition)) = self.find(name) else {
            bail!("Tool '{}' is not available", name);
        };

        validate_arguments(&definition, &arguments)?;
        tracing::debug!(tool = %name, tool_call_id = %tool_call_id, "Invoking tool");
        tool.call(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(name: &str, required: Value) -> FunctionTool {
        FunctionTool::new(
            ToolDefinition::new(
                name,
                "Echo the arguments",
                json!({"type": "object", "required": required}),
            ),
            |args| async move { Ok(args) },
        )
    }

    #[test]
    fn test_validate_arguments() {
        let definition = echo("search", json!(["query"])).definition();

        assert!(validate_arguments(&definition, &json!({"query": "rust"})).is_ok());
        assert!(validate_arguments(&definition, &json!({})).is_err());
        assert!(validate_arguments(&definition, &json!(["query"])).is_err());
    }

    #[test]
    fn test_permitted_filters_by_posture_and_config() {
        let registry = ToolRegistry::new()
            .with_tool(echo("search", json!([])))
            .with_tool(echo("send_mail", json!([])).with_scope("mail.send"))
            .with_tool(echo("unused", json!([])));
        let names = vec!["search".to_string(), "send_mail".to_string(), "missing".to_string()];

        let anonymous = registry.permitted(&names, &Posture::default());
        let names_offered: Vec<String> = anonymous.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names_offered, vec!["search"]);

        let granted = registry.permitted(&names, &Posture::new(["mail.send"]));
        assert_eq!(granted.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_set_rejects_unknown_and_invalid_calls() {
        let registry = ToolRegistry::new().with_tool(echo("search", json!(["query"])));
        let set = registry.permitted(&["search".to_string()], &Posture::default());

        let ok = set.call("search", json!({"query": "x"}), "call_1").await.unwrap();
        assert_eq!(ok, json!({"query": "x"}));

        let missing = set.call("search", json!({}), "call_2").await.unwrap_err();
        assert!(missing.to_string().contains("query"));

        let unknown = set.call("delete_everything", json!({}), "call_3").await.unwrap_err();
        assert!(unknown.to_string().contains("not available"));
    }
}

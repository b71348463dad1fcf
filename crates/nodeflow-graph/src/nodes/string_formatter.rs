use anyhow::Result;
use async_trait::async_trait;
use nodeflow_types::{NodeResult, StringFormatterConfig, StringFormatterNodeResult};
use std::collections::BTreeMap;
use tera::{Context, Tera};

use crate::context::AgentContext;
use crate::node::{NodeInfo, NodeInput, NodeLogic};

const TEMPLATE_NAME: &str = "string_formatter";

/// Renders a tera template.
///
/// The template sees `inputs.<name>` (this node's inputs), `nodes.<name>`
/// (every result registered so far) and `execution.*`.
pub struct StringFormatterNode {
    config: StringFormatterConfig,
}

impl StringFormatterNode {
    pub fn new(config: StringFormatterConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, context: &Context) -> std::result::Result<String, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, &self.config.template)?;
        tera.render(TEMPLATE_NAME, context)
    }
}

#[async_trait]
impl NodeLogic for StringFormatterNode {
    async fn run(&self, _node: &NodeInfo, inputs: &[NodeInput], ctx: &AgentContext) -> Result<NodeResult> {
        let named_inputs: BTreeMap<&str, String> = inputs
            .iter()
            .map(|input| (input.node_name.as_str(), input.result.text()))
            .collect();

        let mut context = Context::new();
        context.insert("inputs", &named_inputs);
        context.insert("nodes", &ctx.texts_by_name().await);
        context.insert("execution", ctx.execution());

        let text = self.render(&context)?;
        Ok(NodeResult::StringFormatter(StringFormatterNodeResult { text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_context() {
        let node = StringFormatterNode::new(StringFormatterConfig::new("Q: {{ inputs.question }}"));
        let mut context = Context::new();
        context.insert("inputs", &BTreeMap::from([("question", "2+2?")]));

        assert_eq!(node.render(&context).unwrap(), "Q: 2+2?");
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let node = StringFormatterNode::new(StringFormatterConfig::new("{{ missing.value }}"));
        assert!(node.render(&Context::new()).is_err());
    }
}

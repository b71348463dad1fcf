pub mod message;
pub mod request;
pub mod tool;

pub use message::{Message, Role};
pub use request::ChatRequest;
pub use tool::{NoTools, ToolCallback, ToolDefinition, ToolInvocation};

pub mod input;
pub mod model;
pub mod output;
pub mod string_formatter;

pub use input::InputNode;
pub use model::ModelNode;
pub use output::OutputNode;
pub use string_formatter::StringFormatterNode;

mod buffering;
mod sse_parser;

pub use buffering::CircularLineBuffer;
pub use sse_parser::{sse_data_stream, DataStream, DONE_MARKER};

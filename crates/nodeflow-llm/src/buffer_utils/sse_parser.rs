use futures::{Stream, StreamExt};
use reqwest::Response;
use std::pin::Pin;

use super::buffering::CircularLineBuffer;
use crate::error::{LlmError, Result};

/// OpenAI terminates its event streams with this payload
pub const DONE_MARKER: &str = "[DONE]";

pub type DataStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Turn an SSE response body into the payloads of its `data:` lines.
///
/// `event:`/`id:` lines and comments are skipped: every vendor we speak to
/// repeats the event type inside the JSON payload. Ends at `[DONE]`.
pub fn sse_data_stream(response: Response) -> DataStream {
    let stream = response.bytes_stream();

    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(stream);
        let mut buffer = CircularLineBuffer::with_capacity(8192);
        let mut body_done = false;

        'outer: loop {
            let line_result = match buffer.next_line() {
                Some(line) => line,
                None if body_done => break,
                None => match byte_chunks.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(&bytes);
                        continue;
                    }
                    Some(Err(e)) => {
                        yield Err(LlmError::Stream(e.to_string()));
                        break;
                    }
                    None => {
                        body_done = true;
                        match buffer.take_remainder() {
                            Some(line) => line,
                            None => break,
                        }
                    }
                },
            };

            match line_result {
                Ok(line) => {
                    if let Some(data) = data_payload(&line) {
                        if data == DONE_MARKER {
                            break 'outer;
                        }
                        yield Ok(data.to_string());
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    })
}

fn data_payload(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("event: message_start"), None);
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("data: "), None);
    }
}

use serde::Deserialize;
use tracing::debug;

use crate::models::StreamFragment;

/// Splits a byte stream into complete lines. Partial lines stay buffered until
/// their newline arrives or the stream ends.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(index) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw = self.pending.drain(..=index).collect::<Vec<_>>();
            if let Some(line) = to_line(&raw[..raw.len() - 1]) {
                lines.push(line);
            }
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        to_line(&raw)
    }
}

fn to_line(raw: &[u8]) -> Option<String> {
    match std::str::from_utf8(raw) {
        Ok(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Err(error) => {
            debug!(error = %error, "skipping non utf-8 stream line");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Decodes one line of the local model server's stream. Both the `generate`
/// (`response`) and `chat` (`message.content`) envelopes are accepted; anything
/// that is not a JSON object of that shape yields `None`.
pub fn decode_fragment(line: &str) -> Option<StreamFragment> {
    let chunk: StreamChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(error) => {
            debug!(error = %error, "skipping malformed stream fragment");
            return None;
        }
    };

    let content = chunk
        .response
        .or_else(|| chunk.message.map(|message| message.content))
        .unwrap_or_default();

    Some(StreamFragment {
        content,
        done: chunk.done,
        error: None,
        kind: None,
    })
}

/// Decodes a fully buffered body into its valid fragments.
#[cfg(test)]
fn decode_lines(body: &str) -> Vec<StreamFragment> {
    let mut buffer = LineBuffer::default();
    let mut lines = buffer.push(body.as_bytes());
    lines.extend(buffer.finish());
    lines.iter().filter_map(|line| decode_fragment(line)).collect()
}

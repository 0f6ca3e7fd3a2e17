//! Line framing and frame classification for the chat event stream.
//!
//! The backend writes one JSON payload per line:
//! ```text
//! data: {"type": "content", "content": "Hel"}
//! data: {"type": "content", "content": "lo"}
//! data: {"type": "end", "full_response": "Hello"}
//! ```
//!
//! Lines without the `data: ` prefix are noise and are skipped.

use serde::Deserialize;

use crate::model::StreamEvent;

const FRAME_PREFIX: &str = "data: ";
const UNKNOWN_SERVER_ERROR: &str = "Unknown server error";

/// Reassembles newline-terminated lines from arbitrarily split chunks.
///
/// Bytes are buffered until a `\n` arrives, so a UTF-8 sequence split across
/// two reads is decoded only once it is whole. The buffer never holds a
/// `\n`, so each push scans only the new chunk.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// delimiter (a trailing `\r` is trimmed too).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let Some(last) = chunk.iter().rposition(|b| *b == b'\n') else {
            self.buf.extend_from_slice(chunk);
            return Vec::new();
        };

        self.buf.extend_from_slice(&chunk[..last]);
        let lines = self
            .buf
            .split(|b| *b == b'\n')
            .map(|line| {
                String::from_utf8_lossy(line)
                    .trim_end_matches('\r')
                    .to_string()
            })
            .collect();

        self.buf.clear();
        self.buf.extend_from_slice(&chunk[last + 1..]);
        lines
    }

    /// Bytes of the incomplete trailing line.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Parse an SSE line to extract the data portion.
///
/// # Example
/// ```
/// use cortexai::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "invalid";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(FRAME_PREFIX).map(|s| s.trim())
}

/// Classify the JSON payload of a frame.
///
/// Returns `Ok(None)` for payloads with an unknown `type`, and an error when
/// the payload is not valid JSON or misses a required field.
pub fn parse_frame(data: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let frame: WireFrame = serde_json::from_str(data)?;
    Ok(frame.into_event())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireFrame {
    Content {
        content: String,
    },
    Image {
        image: String,
    },
    End {
        #[serde(default)]
        full_response: Option<String>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl WireFrame {
    fn into_event(self) -> Option<StreamEvent> {
        match self {
            WireFrame::Content { content } => Some(StreamEvent::Content { text: content }),
            WireFrame::Image { image } => Some(StreamEvent::Image { data: image }),
            WireFrame::End { full_response } => Some(StreamEvent::End {
                final_text: full_response.filter(|s| !s.is_empty()),
            }),
            WireFrame::Error { error } => Some(StreamEvent::Error {
                message: error.unwrap_or_else(|| UNKNOWN_SERVER_ERROR.to_string()),
            }),
            WireFrame::Other => None,
        }
    }
}

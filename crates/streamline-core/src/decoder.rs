//! Record decoding for framed lines.
//!
//! A [`RecordDecoder`] turns one line produced by the
//! [`LineFramer`](crate::framer::LineFramer) into a [`Record`].  Decoding never
//! fails: payloads that do not match the expected upstream shape degrade to
//! [`Record::Raw`] so that a malformed event cannot abort the stream.
//!
//! The default [`ChatCompletionsDecoder`] understands the OpenAI Chat
//! Completions streaming convention (`data: {...choices[0].delta.content...}`
//! terminated by `data: [DONE]`).  Other upstream record shapes can be plugged
//! in by implementing the trait.

use serde_json::Value;

/// Prefix carried by every SSE data line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that marks logical end-of-stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A text delta extracted from a structured payload.
    Text(String),
    /// The logical end-of-stream sentinel.
    EndOfStream,
    /// A line (or data payload) passed through unchanged.
    Raw(String),
}

impl Record {
    /// The text this record contributes to the output, if any.
    ///
    /// Returns `None` for the sentinel and for empty payloads.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Raw(text) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Converts a single framed line into a [`Record`].
pub trait RecordDecoder: Send + Sync {
    /// Decode one line (without its `'\n'` terminator).
    fn decode(&self, line: &str) -> Record;
}

// ---------------------------------------------------------------------------
// Chat Completions decoder
// ---------------------------------------------------------------------------

/// Decoder for OpenAI-style Chat Completions SSE streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletionsDecoder;

impl RecordDecoder for ChatCompletionsDecoder {
    fn decode(&self, line: &str) -> Record {
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return Record::Raw(line.to_owned());
        };
        // Tolerate CRLF line endings on data payloads.
        let data = data.strip_suffix('\r').unwrap_or(data);

        if data == DONE_SENTINEL {
            return Record::EndOfStream;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(v) => match v["choices"][0]["delta"]["content"].as_str() {
                Some(content) => Record::Text(content.to_owned()),
                None => {
                    tracing::trace!(data, "no delta content in SSE payload; passing through");
                    Record::Raw(data.to_owned())
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "non-JSON SSE payload; passing through");
                Record::Raw(data.to_owned())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Plain text decoder
// ---------------------------------------------------------------------------

/// Decoder for newline-framed plain text: every line is passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextDecoder;

impl RecordDecoder for PlainTextDecoder {
    fn decode(&self, line: &str) -> Record {
        Record::Raw(line.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Server-sent event decoding for streamed completions.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::constants::streaming::MAX_DECODER_BUFFER;
use crate::types::{AiServiceError, ErrorCategory, Result, UPSTREAM_FAILURE_STATUS};

/// Buffers partial chunks and yields complete `data:` frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes and return every frame completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        if self.buffer.len() > MAX_DECODER_BUFFER {
            warn!(
                limit_kb = MAX_DECODER_BUFFER / 1024,
                "SSE buffer over limit, dropping oldest data"
            );
            let mut keep_from = self.buffer.len() - MAX_DECODER_BUFFER / 2;
            while !self.buffer.is_char_boundary(keep_from) {
                keep_from += 1;
            }
            self.buffer.drain(..keep_from);
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                frames.push(SseFrame {
                    data: data.trim_start().to_string(),
                });
            }
        }
        frames
    }

    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }

    pub fn has_remaining(&self) -> bool {
        !self.buffer.trim().is_empty()
    }
}

/// A complete SSE `data:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub data: String,
}

impl SseFrame {
    /// The `[DONE]` sentinel that ends OpenAI-style streams
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| {
            AiServiceError::new(
                ErrorCategory::ParseError,
                UPSTREAM_FAILURE_STATUS,
                format!("Malformed stream frame: {} ({})", e, crate::types::truncate_chars(&self.data, 200)),
            )
            .into()
        })
    }
}

//! Incremental decoder for the relay's `text/event-stream` body.

use neuralchat_types::StreamFrame;
use tracing::debug;

const DATA_PREFIX: &str = "data: ";

/// Splits arbitrary byte chunks into lines, carrying partial lines over to
/// the next chunk, and decodes `data: ` lines into frames.
///
/// Other lines (comments, keep-alives, blank separators) are ignored, as are
/// data lines that are not valid frames.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            match StreamFrame::parse(data) {
                Ok(frame) => frames.push(frame),
                Err(e) => debug!(error = %e, "Skipping malformed stream frame"),
            }
        }
        frames
    }
}

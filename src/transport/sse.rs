use log::debug;
use serde_json::Value;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Incremental `data: <json>` framing over arbitrarily split byte chunks.
///
/// Lines that are not `data:` lines, the `[DONE]` marker and payloads that
/// are not JSON are dropped.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(value) = decode_line(&line) {
                events.push(value);
            }
        }
        events
    }

    /// Flushes a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<Value> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(line: &[u8]) -> Option<Value> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_MARKER {
        return None;
    }
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Skipping non-JSON data line: {}", e);
            None
        }
    }
}

/// Payloads of every `data:` line in a complete body, `[DONE]` included.
pub fn data_lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines().filter_map(|line| line.trim_end_matches('\r').strip_prefix(DATA_PREFIX).map(str::trim))
}

pub fn is_done_marker(payload: &str) -> bool {
    payload == DONE_MARKER
}

// ABOUTME: Incremental server-sent-events framing for streamed model responses.
// ABOUTME: Buffers raw bytes until a blank line closes an event, then yields its data lines.

/// Accumulates response bytes and splits them into complete event blocks.
///
/// Bytes are kept undecoded until a block is complete so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// The next complete event block, if one is buffered. `\r\n` line endings
    /// are normalized.
    pub fn next_event_block(&mut self) -> Option<String> {
        if self.buffer.contains(&b'\r') {
            self.buffer.retain(|b| *b != b'\r');
        }
        let boundary = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let block = std::mem::replace(&mut self.buffer, remaining);
        Some(String::from_utf8_lossy(&block).into_owned())
    }

    /// Whatever is left once the stream ended without a closing blank line.
    pub fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// Payloads of the `data:` lines in a block, without the `[DONE]` sentinel.
pub fn data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .filter(|data| *data != "[DONE]")
        .collect()
}

//! Server-Sent-Events framing on both sides of the translator.
//!
//! Inbound, [`LineBuffer`] reassembles newline-terminated lines from arbitrarily
//! split byte chunks and [`classify_line`] picks out the `data: ` payloads.
//! Outbound, [`encode_event`] frames an Anthropic [`StreamEvent`] as
//! `event: <type>\ndata: <json>\n\n`.

use super::anthropic_types::StreamEvent;
use crate::error::Result;
use bytes::Bytes;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles complete lines from a chunked byte stream.
///
/// Holds at most `max_line_bytes` of pending data. A line longer than that is
/// dropped in full, however it was split across chunks. Lines are decoded as
/// UTF-8 only once complete, so a multibyte character split across two chunks
/// survives intact.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_bytes: usize,
    overflowed: bool,
    dropped: u64,
}

impl LineBuffer {
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes,
            overflowed: false,
            dropped: 0,
        }
    }

    /// Feed one chunk, returning every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.append(&rest[..pos]);
            if let Some(line) = self.take_line() {
                lines.push(line);
            }
            rest = &rest[pos + 1..];
        }
        self.append(rest);

        lines
    }

    /// Flush the trailing unterminated line, if any, at end of input.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() && !self.overflowed {
            return None;
        }
        self.take_line()
    }

    /// Number of lines discarded for exceeding the length limit.
    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.pending.len() + bytes.len() > self.max_line_bytes {
            self.pending.clear();
            self.overflowed = true;
            self.dropped += 1;
            tracing::warn!(
                max_line_bytes = self.max_line_bytes,
                "Dropping oversized upstream SSE line"
            );
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    fn take_line(&mut self) -> Option<String> {
        if std::mem::take(&mut self.overflowed) {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// What a single inbound line means to the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// JSON payload following `data: `, trimmed.
    Data(&'a str),
    /// The `data: [DONE]` terminator.
    Done,
    /// Blank lines, `event:` lines, comments, anything else.
    Ignored,
}

pub fn classify_line(line: &str) -> SseLine<'_> {
    if line.trim().is_empty() {
        return SseLine::Ignored;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(payload) if payload.trim() == DONE_SENTINEL => SseLine::Done,
        Some(payload) => SseLine::Data(payload.trim()),
        None => SseLine::Ignored,
    }
}

/// Frame an Anthropic stream event for the wire.
pub fn encode_event(event: &StreamEvent) -> Result<Bytes> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        event.event_name(),
        json
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buf = LineBuffer::with_max_line_bytes(1024);
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\n\nda"), vec!["data: {\"a\":1}", ""]);
        assert_eq!(buf.push(b"ta: x\n"), vec!["data: x"]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut buf = LineBuffer::with_max_line_bytes(1024);
        assert!(buf.push(b"data: {}").is_empty());
        assert_eq!(buf.finish(), Some("data: {}".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "data: héllo\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut buf = LineBuffer::with_max_line_bytes(1024);
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["data: héllo"]);
    }

    #[test]
    fn test_oversized_line_dropped_regardless_of_split() {
        let input = b"data: 0123456789\ndata: ok\n";

        let mut whole = LineBuffer::with_max_line_bytes(10);
        assert_eq!(whole.push(input), vec!["data: ok"]);
        assert_eq!(whole.dropped_lines(), 1);

        let mut bytewise = LineBuffer::with_max_line_bytes(10);
        let mut lines = Vec::new();
        for b in input.iter() {
            lines.extend(bytewise.push(std::slice::from_ref(b)));
        }
        assert_eq!(lines, vec!["data: ok"]);
        assert_eq!(bytewise.dropped_lines(), 1);
    }

    #[test]
    fn test_oversized_trailing_line_not_flushed() {
        let mut buf = LineBuffer::with_max_line_bytes(4);
        assert!(buf.push(b"data: too long").is_empty());
        assert_eq!(buf.finish(), None);
        assert_eq!(buf.dropped_lines(), 1);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("data: {\"x\":1}\r"), SseLine::Data("{\"x\":1}"));
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line("event: completion"), SseLine::Ignored);
        assert_eq!(classify_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(classify_line("data:{}"), SseLine::Ignored);
        assert_eq!(classify_line("   "), SseLine::Ignored);
    }

    #[test]
    fn test_encode_event_framing() {
        let bytes = encode_event(&StreamEvent::MessageStop).unwrap();
        assert_eq!(
            &bytes[..],
            b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"
        );
    }
}

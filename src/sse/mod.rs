//! Incremental decoder for `data:`-framed event streams.
//!
//! Both hops of the relay speak the same line format: the provider sends
//! `data: {json}` records terminated by `data: [DONE]`, and the relay sends
//! `data: {"content": ...}` records to the widget. Bytes arrive in arbitrary
//! pieces, so the decoder buffers until it has a whole line.
//!
//! Line grammar, after stripping a trailing `\r`:
//!
//! | line                    | result                 |
//! |-------------------------|------------------------|
//! | empty                   | ignored (separator)    |
//! | `:...`                  | ignored (comment)      |
//! | `data:[DONE]`           | [`Frame::Done`]        |
//! | `data:<payload>`        | [`Frame::Data`]        |
//! | any other field         | ignored                |
//! | not valid UTF-8         | ignored                |
//!
//! A single space after `data:` is part of the framing, not the payload.
//! Deciding whether a payload is well-formed JSON is left to the caller.

use bytes::{Bytes, BytesMut};

/// Payload that marks the end of a provider stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(String),
    Done,
}

/// Splits a byte stream into [`Frame`]s.
///
/// ```
/// use chatrelay::sse::{EventDecoder, Frame};
///
/// let mut decoder = EventDecoder::new();
/// assert!(decoder.push(b"data: {\"a\"").is_empty());
/// assert_eq!(
///     decoder.push(b":1}\n\ndata: [DONE]\n"),
///     vec![Frame::Data("{\"a\":1}".to_owned()), Frame::Done],
/// );
/// ```
#[derive(Debug, Default)]
pub struct EventDecoder {
    buf: BytesMut,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `bytes` and returns every frame completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if let Some(frame) = classify(&line[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decodes whatever is left once the underlying stream has ended.
    ///
    /// A provider may close the connection without a final newline; the
    /// partial line is still a record.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buf.is_empty() {
            return None;
        }
        let line = self.buf.split();
        classify(&line)
    }
}

fn classify(line: &[u8]) -> Option<Frame> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Ok(line) = std::str::from_utf8(line) else {
        tracing::debug!(len = line.len(), "skipping non UTF-8 event line");
        return None;
    };

    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_owned()))
    }
}

/// Frames `payload` as one outbound record: `data: <payload>\n\n`.
pub fn data_record(payload: &str) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> Frame {
        Frame::Data(s.to_owned())
    }

    #[test]
    fn ignores_blank_comment_and_other_fields() {
        let mut d = EventDecoder::new();
        let frames = d.push(b"\n: keep-alive\nevent: message\nid: 7\nretry: 10\ndata: x\n");
        assert_eq!(frames, vec![data("x")]);
    }

    #[test]
    fn crlf_line_endings() {
        let mut d = EventDecoder::new();
        assert_eq!(d.push(b"data: a\r\n\r\ndata: b\r\n"), vec![data("a"), data("b")]);
    }

    #[test]
    fn optional_space_after_colon() {
        let mut d = EventDecoder::new();
        assert_eq!(d.push(b"data:tight\ndata:  two\n"), vec![data("tight"), data(" two")]);
    }

    #[test]
    fn done_sentinel() {
        let mut d = EventDecoder::new();
        assert_eq!(d.push(b"data: [DONE]\n"), vec![Frame::Done]);
    }

    #[test]
    fn line_split_across_pushes() {
        let mut d = EventDecoder::new();
        assert!(d.push(b"da").is_empty());
        assert!(d.push(b"ta: hel").is_empty());
        assert_eq!(d.push(b"lo\n"), vec![data("hello")]);
    }

    #[test]
    fn multibyte_character_split_across_pushes() {
        let text = "data: café ☕\n".as_bytes();
        let (head, tail) = text.split_at(text.len() - 3);
        let mut d = EventDecoder::new();
        assert!(d.push(head).is_empty());
        assert_eq!(d.push(tail), vec![data("café ☕")]);
    }

    #[test]
    fn invalid_utf8_line_is_skipped_not_fatal() {
        let mut d = EventDecoder::new();
        let frames = d.push(b"data: \xff\xfe\ndata: ok\n");
        assert_eq!(frames, vec![data("ok")]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut d = EventDecoder::new();
        assert!(d.push(b"data: tail").is_empty());
        assert_eq!(d.finish(), Some(data("tail")));
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn data_record_framing() {
        assert_eq!(&data_record(r#"{"content":"hi"}"#)[..], b"data: {\"content\":\"hi\"}\n\n");
    }
}

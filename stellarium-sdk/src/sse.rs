//! Incremental decoder for `text/event-stream` bodies.
//!
//! Horizon streams one JSON record per event and uses the event `id` as the
//! record's paging token. Network chunks can split a frame anywhere, so the
//! decoder buffers bytes until a full line is available.

use bytes::{Buf, BytesMut};

/// A complete server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Last `id:` field seen in this event.
    pub id: Option<String>,
    /// `event:` field, if any.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    current: SseEvent,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line = self.buffer.split_to(newline);
            self.buffer.advance(1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
                self.has_data = true;
            }
            "id" => self.current.id = Some(value.to_owned()),
            "event" => self.current.event = Some(value.to_owned()),
            // `retry` only tunes reconnection delay, which the caller owns.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if !self.has_data {
            self.current = SseEvent::default();
            return None;
        }
        self.has_data = false;
        Some(std::mem::take(&mut self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"id: 123-1\ndata: {\"a\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                id: Some("123-1".to_string()),
                event: None,
                data: "{\"a\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn reassembles_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"id: 7\nda").is_empty());
        assert!(decoder.feed(b"ta: {\"x\"").is_empty());
        let events = decoder.feed(b":true}\r\n\r\nretry: 1000\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].data, "{\"x\":true}");
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: message\ndata: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn blank_lines_without_data_emit_nothing() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"retry: 1000\n\n\n");
        assert!(events.is_empty());

        let events = decoder.feed(b"data: \"hello\"\n\ndata: next\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "\"hello\"");
        assert_eq!(events[0].id, None);
        assert_eq!(events[1].data, "next");
    }
}

//! Incremental parser for streamed reply bodies.
//!
//! A streaming command answers with one long-lived JSON array:
//!
//! ```json
//! [ {"stream": "start"}, {"version": "..."},
//!   {"error": "", "result": ...}, ...,
//!   {"stream": "end"} ]
//! ```
//!
//! The parser consumes the body in arbitrary byte chunks and emits one
//! [`StreamEvent`] per decoded array element, hiding the outer framing. It is
//! a state machine over an internal buffer: bytes accumulate until a complete
//! array element is available, the element is decoded, and the state advances.
//!
//! # Parsing flow
//!
//! 1. **AwaitArrayStart**: skip whitespace, require the `[` delimiter
//! 2. **AwaitStreamStart**: require the `{"stream":"start"}` sentinel
//! 3. **AwaitVersion**: decode the `{"version": ...}` announcement
//! 4. **Replies**: each element is either a reply (non-empty `result`) or the
//!    `{"stream":"end"}` sentinel; the closing `]` also ends the stream
//! 5. **Done**: anything after the end marker is ignored
//!
//! Framing violations and undecodable elements are terminal: the parser moves
//! to **Failed** and the error propagates to the delivery layer exactly once.

use bytes::{Bytes, BytesMut};

use crate::error::{CanopyError, Result};
use crate::protocol::constants::stream as sentinel;
use crate::protocol::reply::{StreamReply, StreamToken, VersionToken, WireReply};
use crate::types::Value;

/// Position in the stream-framing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the opening `[` of the outer array.
    AwaitArrayStart,
    /// Waiting for the `{"stream":"start"}` sentinel.
    AwaitStreamStart,
    /// Waiting for the `{"version": ...}` announcement.
    AwaitVersion,
    /// Consuming reply elements.
    Replies,
    /// Stream terminated normally.
    Done,
    /// A framing or decode error occurred.
    Failed,
}

/// One decoded element of the stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// The protocol version announced after the start sentinel.
    Version(Value),
    /// A reply carrying a raw result payload.
    Reply(StreamReply),
    /// Normal end of the stream (end sentinel or array close).
    End,
}

enum Token {
    /// Not enough buffered bytes for a complete element.
    Pending,
    /// A complete array element.
    Element(Bytes),
    /// The closing `]` of the outer array.
    Close,
}

/// Incremental stream-framing parser.
///
/// Feed raw body chunks with [`feed`](StreamParser::feed); each call returns
/// the events completed by those bytes. Call [`finish`](StreamParser::finish)
/// when the connection closes to validate the final state.
#[derive(Debug)]
pub struct StreamParser {
    buffer: BytesMut,
    state: ParseState,
    /// Set between an element and its trailing `,` or `]`.
    expect_separator: bool,
}

impl StreamParser {
    /// Create a parser at the start of a response body.
    pub fn new() -> Self {
        StreamParser {
            buffer: BytesMut::with_capacity(8192),
            state: ParseState::AwaitArrayStart,
            expect_separator: false,
        }
    }

    /// Feed body bytes, returning the events they complete.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.extend_from_slice(data);
        let mut events = Vec::new();

        loop {
            match self.state {
                ParseState::Done | ParseState::Failed => break,
                ParseState::AwaitArrayStart => {
                    self.skip_whitespace();
                    match self.buffer.first() {
                        None => break,
                        Some(b'[') => {
                            let _ = self.buffer.split_to(1);
                            self.state = ParseState::AwaitStreamStart;
                        }
                        Some(&b) => {
                            return self.fail(format!("expected '[', got {:?}", b as char));
                        }
                    }
                }
                _ => {
                    let token = match self.next_token() {
                        Ok(t) => t,
                        Err(e) => {
                            self.state = ParseState::Failed;
                            return Err(e);
                        }
                    };
                    match token {
                        Token::Pending => break,
                        Token::Close => {
                            if self.state == ParseState::Replies {
                                self.state = ParseState::Done;
                                events.push(StreamEvent::End);
                            } else {
                                return self.fail("stream closed during handshake".to_string());
                            }
                        }
                        Token::Element(elem) => match self.dispatch(&elem) {
                            Ok(Some(ev)) => events.push(ev),
                            Ok(None) => {}
                            Err(e) => {
                                self.state = ParseState::Failed;
                                return Err(e);
                            }
                        },
                    }
                }
            }
        }

        Ok(events)
    }

    /// Validate the state at end-of-body. Closing the connection mid-replies
    /// (or right after the end marker) is a normal termination; closing it
    /// during the handshake is not.
    pub fn finish(&self) -> Result<()> {
        match self.state {
            ParseState::Replies | ParseState::Done | ParseState::Failed => Ok(()),
            _ => Err(CanopyError::Framing(
                "connection closed before stream start".to_string(),
            )),
        }
    }

    /// Current state of the framing state machine.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes accumulated but not yet consumed.
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    fn fail<T>(&mut self, msg: String) -> Result<T> {
        self.state = ParseState::Failed;
        Err(CanopyError::Framing(msg))
    }

    fn skip_whitespace(&mut self) {
        let n = self
            .buffer
            .iter()
            .take_while(|b| matches!(**b, b' ' | b'\t' | b'\r' | b'\n'))
            .count();
        if n > 0 {
            let _ = self.buffer.split_to(n);
        }
    }

    /// Pull the next array element (or the array close) off the buffer.
    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        if self.expect_separator {
            match self.buffer.first() {
                None => return Ok(Token::Pending),
                Some(b',') => {
                    let _ = self.buffer.split_to(1);
                    self.expect_separator = false;
                    self.skip_whitespace();
                }
                Some(b']') => {
                    let _ = self.buffer.split_to(1);
                    return Ok(Token::Close);
                }
                Some(&b) => {
                    return Err(CanopyError::Framing(format!(
                        "expected ',' or ']', got {:?}",
                        b as char
                    )))
                }
            }
        }
        match self.buffer.first() {
            None => Ok(Token::Pending),
            Some(b']') => {
                let _ = self.buffer.split_to(1);
                Ok(Token::Close)
            }
            _ => match scan_value(&self.buffer) {
                None => Ok(Token::Pending),
                Some(len) => {
                    let elem = self.buffer.split_to(len).freeze();
                    self.expect_separator = true;
                    Ok(Token::Element(elem))
                }
            },
        }
    }

    /// Decode one element according to the current state.
    fn dispatch(&mut self, elem: &[u8]) -> Result<Option<StreamEvent>> {
        let text = std::str::from_utf8(elem)
            .map_err(|_| CanopyError::Framing("stream element is not valid utf-8".to_string()))?;

        match self.state {
            ParseState::AwaitStreamStart => {
                let token: StreamToken = serde_json::from_str(text).map_err(|_| {
                    CanopyError::Framing(format!("expected stream start sentinel, got {text}"))
                })?;
                if token.stream.as_bytes() != sentinel::START.as_bytes() {
                    return Err(CanopyError::Framing(format!(
                        "unexpected stream token {:?}",
                        token.stream
                    )));
                }
                self.state = ParseState::AwaitVersion;
                Ok(None)
            }
            ParseState::AwaitVersion => {
                let token: VersionToken = serde_json::from_str(text).map_err(|_| {
                    CanopyError::Framing(format!("expected version announcement, got {text}"))
                })?;
                self.state = ParseState::Replies;
                Ok(Some(StreamEvent::Version(token.version)))
            }
            ParseState::Replies => {
                let reply: WireReply = serde_json::from_str(text)?;
                match reply.result {
                    Some(result) => Ok(Some(StreamEvent::Reply(StreamReply {
                        error: reply.error,
                        result,
                    }))),
                    // An empty result re-reads as a stream-control object.
                    None => {
                        if let Ok(token) = serde_json::from_str::<StreamToken>(text) {
                            if token.stream.as_bytes() == sentinel::END.as_bytes() {
                                self.state = ParseState::Done;
                                return Ok(Some(StreamEvent::End));
                            }
                        }
                        if !reply.error.is_empty() {
                            return Err(CanopyError::Server(reply.error.to_string()));
                        }
                        Err(CanopyError::Framing(format!(
                            "reply without result or end marker: {text}"
                        )))
                    }
                }
            }
            _ => Err(CanopyError::Framing(
                "element in unexpected state".to_string(),
            )),
        }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the first complete JSON value in `buf`, or `None` if more bytes
/// are needed. A primitive's length excludes the `,`/`]` that delimits it.
fn scan_value(buf: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                if depth == 0 {
                    // Delimiter of the enclosing array: the primitive before
                    // it is the value.
                    return Some(i);
                }
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b',' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut StreamParser, body: &str) -> Result<Vec<StreamEvent>> {
        parser.feed(body.as_bytes())
    }

    #[test]
    fn scans_complete_values() {
        assert_eq!(scan_value(br#"{"a":1},"#), Some(7));
        assert_eq!(scan_value(br#"[1,[2,3]],"#), Some(9));
        assert_eq!(scan_value(br#""a,b","#), Some(5));
        assert_eq!(scan_value(br#""a\"b","#), Some(6));
        assert_eq!(scan_value(b"42,"), Some(2));
        assert_eq!(scan_value(b"42]"), Some(2));
    }

    #[test]
    fn scan_waits_for_more_bytes() {
        assert_eq!(scan_value(br#"{"a":"#), None);
        assert_eq!(scan_value(br#""unterminated"#), None);
        assert_eq!(scan_value(b"42"), None);
    }

    #[test]
    fn full_stream_in_one_chunk() {
        let mut parser = StreamParser::new();
        let events = feed_all(
            &mut parser,
            r#"[{"stream":"start"},{"version":"v1"},{"error":"","result":["a"]},{"stream":"end"}]"#,
        )
        .unwrap();

        assert!(matches!(events[0], StreamEvent::Version(_)));
        match &events[1] {
            StreamEvent::Reply(r) => assert_eq!(r.result.get(), r#"["a"]"#),
            other => panic!("expected reply, got {other:?}"),
        }
        assert!(matches!(events[2], StreamEvent::End));
        assert_eq!(parser.state(), ParseState::Done);
    }

    #[test]
    fn handles_arbitrary_chunk_boundaries() {
        let body = r#"[{"stream":"start"},{"version":"v1"},{"error":"","result":[["ab12","foo"]]},{"stream":"end"}]"#;
        let mut parser = StreamParser::new();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(3) {
            events.extend(parser.feed(chunk).unwrap());
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], StreamEvent::End));
    }

    #[test]
    fn rejects_non_array_body() {
        let mut parser = StreamParser::new();
        let err = feed_all(&mut parser, r#"{"error":"denied"}"#).unwrap_err();
        assert!(matches!(err, CanopyError::Framing(_)));
        assert_eq!(parser.state(), ParseState::Failed);
        // The offending bytes stay buffered for the error-object fallback.
        assert!(!parser.buffered().is_empty());
    }

    #[test]
    fn rejects_missing_start_sentinel() {
        let mut parser = StreamParser::new();
        let err = feed_all(&mut parser, r#"[{"version":"v1"}]"#).unwrap_err();
        assert!(matches!(err, CanopyError::Framing(_)));
    }

    #[test]
    fn rejects_wrong_start_value() {
        let mut parser = StreamParser::new();
        let err = feed_all(&mut parser, r#"[{"stream":"begin"}]"#).unwrap_err();
        assert!(matches!(err, CanopyError::Framing(_)));
    }

    #[test]
    fn array_close_ends_replies() {
        let mut parser = StreamParser::new();
        let events = feed_all(
            &mut parser,
            r#"[{"stream":"start"},{"version":"v1"},{"error":"","result":"x"}]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], StreamEvent::End));
        assert!(parser.finish().is_ok());
    }

    #[test]
    fn error_reply_without_result_is_terminal() {
        let mut parser = StreamParser::new();
        let err = feed_all(
            &mut parser,
            r#"[{"stream":"start"},{"version":"v1"},{"error":"boom"},"#,
        )
        .unwrap_err();
        match err {
            CanopyError::Server(msg) => assert_eq!(msg, "boom"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn ignores_bytes_after_end_marker() {
        let mut parser = StreamParser::new();
        let events = feed_all(
            &mut parser,
            r#"[{"stream":"start"},{"version":"v1"},{"stream":"end"},{"error":"","result":"x"}]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::End));
        assert!(parser.feed(b"garbage").unwrap().is_empty());
    }

    #[test]
    fn end_of_body_during_handshake_is_an_error() {
        let mut parser = StreamParser::new();
        parser.feed(br#"[{"stream":"start"}"#).unwrap();
        assert!(parser.finish().is_err());
    }

    #[test]
    fn end_of_body_mid_replies_is_normal() {
        let mut parser = StreamParser::new();
        parser
            .feed(br#"[{"stream":"start"},{"version":"v1"},"#)
            .unwrap();
        assert!(parser.finish().is_ok());
    }
}

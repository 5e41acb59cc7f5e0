//! Decoded reply streams over long-lived response bodies.
//!
//! [`ReplyStream`] is the raw streaming primitive: it owns one open HTTP
//! response body, decodes the array framing on a background task, and hands
//! the caller a consumable sequence of [`StreamReply`] values. The watch
//! subsystem and key iteration are layered on top of it.
//!
//! # Lifecycle
//!
//! 1. Created from a live response via [`ReplyStream::from_response`]. The
//!    framing handshake (array open, start sentinel, version announcement) is
//!    driven before returning, so a malformed stream fails the open call and
//!    never emits a value.
//! 2. A background task reads body chunks, feeds the framing parser and
//!    delivers replies over a bounded channel (capacity 100). A full channel
//!    suspends the task until the consumer drains it.
//! 3. The task exits on the end sentinel, the array close, end-of-body, a
//!    decode failure (delivered in-band first) or consumer abandonment; the
//!    response body is owned by the task and dropped exactly once on exit.
//!
//! Dropping or closing the consumer handle is sufficient to release the
//! connection; no explicit unsubscribe call exists.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::client::parser::{ParseState, StreamEvent, StreamParser};
use crate::error::{CanopyError, Result};
use crate::protocol::reply::{ErrorVersion, StreamReply};
use crate::types::Path;

/// Pending replies buffered between the decode task and the consumer.
const REPLY_BUFFER: usize = 100;

/// An ordered, lazily-produced sequence of replies from one open stream.
///
/// Yields `Ok(StreamReply)` per decoded reply and at most one `Err` before
/// closing; [`next`](ReplyStream::next) returns `None` once the stream is
/// finished. Also implements [`Stream`] for use with `StreamExt` combinators.
pub struct ReplyStream {
    receiver: Option<mpsc::Receiver<Result<StreamReply>>>,
}

impl ReplyStream {
    /// Decode a streamed response body into a reply sequence.
    ///
    /// Drives the framing handshake before returning: transport errors, a
    /// non-array body and a missing start sentinel all fail here, with zero
    /// values emitted. When the body is not an array, the remainder is read
    /// and decoded as a bare `{"error": ...}` object so a server-side error
    /// is surfaced instead of the framing violation.
    pub async fn from_response(response: reqwest::Response) -> Result<Self> {
        let mut body = response.bytes_stream();
        let mut parser = StreamParser::new();
        let mut pending = Vec::new();

        // Handshake: feed chunks until the parser is past the version
        // announcement.
        loop {
            let item = body.next().await;
            match item {
                Some(Ok(chunk)) => {
                    let at_array_start = parser.state() == ParseState::AwaitArrayStart;
                    match parser.feed(&chunk) {
                        Ok(events) => pending.extend(events),
                        Err(e) if at_array_start => {
                            return Err(recover_error_object(&parser, body, e).await);
                        }
                        Err(e) => return Err(e),
                    }
                    if !matches!(
                        parser.state(),
                        ParseState::AwaitArrayStart
                            | ParseState::AwaitStreamStart
                            | ParseState::AwaitVersion
                    ) {
                        break;
                    }
                }
                Some(Err(e)) => return Err(CanopyError::Http(e.to_string())),
                None => {
                    return Err(parser.finish().err().unwrap_or_else(|| {
                        CanopyError::Framing("stream ended before handshake".to_string())
                    }));
                }
            }
        }

        let (tx, rx) = mpsc::channel(REPLY_BUFFER);

        tokio::spawn(async move {
            for ev in pending {
                if !deliver(&tx, ev).await {
                    return;
                }
            }
            loop {
                tokio::select! {
                    // Consumer handle dropped: release the connection.
                    _ = tx.closed() => return,
                    chunk = body.next() => match chunk {
                        Some(Ok(chunk)) => match parser.feed(&chunk) {
                            Ok(events) => {
                                for ev in events {
                                    if !deliver(&tx, ev).await {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        },
                        Some(Err(e)) => {
                            let _ = tx.send(Err(CanopyError::Http(e.to_string()))).await;
                            return;
                        }
                        None => {
                            if let Err(e) = parser.finish() {
                                let _ = tx.send(Err(e)).await;
                            }
                            return;
                        }
                    },
                }
            }
        });

        Ok(ReplyStream { receiver: Some(rx) })
    }

    /// Receive the next reply.
    ///
    /// Returns `None` once the stream has terminated (end sentinel, body
    /// close, or after a delivered error).
    pub async fn next(&mut self) -> Option<Result<StreamReply>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Stop consuming and release the connection. Closing an already-closed
    /// stream has no effect.
    pub fn close(&mut self) {
        self.receiver = None;
    }
}

impl Stream for ReplyStream {
    type Item = Result<StreamReply>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

/// A streamed enumeration of keys, as produced by the `iter` command.
///
/// Yields `Ok(Path)` per key; a decode failure is delivered in-band as one
/// final `Err`, after which the sequence ends.
pub struct KeyStream {
    receiver: Option<mpsc::Receiver<Result<Path>>>,
}

impl KeyStream {
    pub(crate) fn spawn(mut replies: ReplyStream) -> Self {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = tx.closed() => return,
                    item = replies.next() => item,
                };
                match item {
                    None => return,
                    Some(Ok(reply)) => match serde_json::from_str::<Path>(reply.result.get()) {
                        Ok(path) => {
                            if tx.send(Ok(path)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e.into())).await;
                            return;
                        }
                    },
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        KeyStream { receiver: Some(rx) }
    }

    /// Receive the next key. `None` once the enumeration has finished.
    pub async fn next(&mut self) -> Option<Result<Path>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Stop the enumeration and release the connection. Idempotent.
    pub fn close(&mut self) {
        self.receiver = None;
    }
}

impl Stream for KeyStream {
    type Item = Result<Path>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

/// Forward one parser event to the consumer. Returns false when the task
/// should stop (stream end or receiver gone).
async fn deliver(tx: &mpsc::Sender<Result<StreamReply>>, ev: StreamEvent) -> bool {
    match ev {
        StreamEvent::Version(v) => {
            tracing::debug!(version = %v, "stream opened");
            true
        }
        StreamEvent::Reply(reply) => tx.send(Ok(reply)).await.is_ok(),
        StreamEvent::End => false,
    }
}

/// The body was not a stream. Read the rest and try to decode a bare
/// `{"error": ..., "version": ...}` object; fall back to the framing error.
async fn recover_error_object<S>(parser: &StreamParser, mut body: S, original: CanopyError) -> CanopyError
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let mut all = parser.buffered().to_vec();
    while let Some(Ok(chunk)) = body.next().await {
        all.extend_from_slice(&chunk);
    }
    match serde_json::from_slice::<ErrorVersion>(&all) {
        Ok(reply) if !reply.error.is_empty() => CanopyError::Server(reply.error.to_string()),
        _ => original,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent() {
        let (_tx, rx) = mpsc::channel::<Result<StreamReply>>(1);
        let mut stream = ReplyStream { receiver: Some(rx) };
        stream.close();
        stream.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn next_drains_channel_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = ReplyStream { receiver: Some(rx) };

        for raw in [r#""one""#, r#""two""#] {
            tx.send(Ok(StreamReply {
                error: Default::default(),
                result: serde_json::value::RawValue::from_string(raw.to_string()).unwrap(),
            }))
            .await
            .unwrap();
        }
        drop(tx);

        assert_eq!(stream.next().await.unwrap().unwrap().result.get(), r#""one""#);
        assert_eq!(stream.next().await.unwrap().unwrap().result.get(), r#""two""#);
        assert!(stream.next().await.is_none());
    }
}

//! Typed watch streams over decoded reply sequences.
//!
//! Two flavors, sharing the same lifecycle (`Opening → Streaming → Closed`):
//!
//! - [`WatchStream`]: a single watched key. Each streamed message carries a
//!   batch of `[commitHex, value]` pairs; pairs are decoded independently and
//!   an undecodable pair (or message) is logged and skipped: a single bad
//!   entry must not kill a long-lived watch, since every message is
//!   self-contained.
//! - [`WatchPathStream`]: a watched subtree. Each message carries a commit
//!   and its ordered change list; any decode failure is fatal, because a
//!   silently dropped change would leave the consumer with an inconsistent
//!   view of the subtree. The failure is delivered as one final record with
//!   its error field set, then the stream closes.
//!
//! The skip-vs-abort split between the two flavors is deliberate and covered
//! by tests; do not make them symmetric.
//!
//! Both streams deliver values in arrival order over a bounded channel of
//! capacity 1, so production tracks the consumer's pace. Dropping or closing
//! a stream handle releases the underlying connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::value::RawValue;
use tokio::sync::mpsc;

use crate::client::stream::ReplyStream;
use crate::error::{CanopyError, Result};
use crate::protocol::reply::StreamReply;
use crate::types::{ChangeKind, Commit, CommitValuePair, Path, PathChange, Value, WatchPathCommit};

/// Pending notifications buffered between the decode task and the consumer.
const WATCH_BUFFER: usize = 1;

/// An open watch on a single key.
///
/// Yields one [`CommitValuePair`] per observed update, in arrival order.
/// `next()` returns `None` once the watch has closed (server end marker,
/// connection close, or stream failure; failures are logged, not surfaced).
#[derive(Debug)]
pub struct WatchStream {
    receiver: Option<mpsc::Receiver<CommitValuePair>>,
}

impl WatchStream {
    pub(crate) fn spawn(mut replies: ReplyStream, path: Path) -> Self {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = tx.closed() => return,
                    item = replies.next() => item,
                };
                let reply = match item {
                    None => return,
                    Some(Ok(reply)) => reply,
                    Some(Err(e)) => {
                        tracing::warn!(path = %path, error = %e, "watch stream failed");
                        return;
                    }
                };
                if !reply.error.is_empty() {
                    tracing::warn!(path = %path, error = %reply.error, "skipping errored watch message");
                    continue;
                }
                let pairs: Vec<Box<RawValue>> = match serde_json::from_str(reply.result.get()) {
                    Ok(pairs) => pairs,
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "skipping undecodable watch message");
                        continue;
                    }
                };
                for raw in pairs {
                    match decode_pair(&raw) {
                        Ok(pair) => {
                            if tx.send(pair).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(path = %path, error = %e, "skipping undecodable watch entry");
                        }
                    }
                }
            }
        });

        WatchStream { receiver: Some(rx) }
    }

    /// Receive the next update. `None` once the watch has closed.
    pub async fn next(&mut self) -> Option<CommitValuePair> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Stop watching and release the connection. Idempotent.
    pub fn close(&mut self) {
        self.receiver = None;
    }
}

impl Stream for WatchStream {
    type Item = CommitValuePair;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

/// An open recursive watch on a subtree.
///
/// Yields one [`WatchPathCommit`] per observed commit, in arrival order. A
/// record with its error field set is terminal: it is the last record
/// delivered, and callers use it to distinguish an abnormal close from a
/// clean end-of-stream.
pub struct WatchPathStream {
    receiver: Option<mpsc::Receiver<WatchPathCommit>>,
}

impl WatchPathStream {
    pub(crate) fn spawn(mut replies: ReplyStream) -> Self {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = tx.closed() => return,
                    item = replies.next() => item,
                };
                match item {
                    None => return,
                    Some(Ok(reply)) => {
                        let record = decode_path_commit(&reply);
                        let failed = record.is_err();
                        if tx.send(record).await.is_err() || failed {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx
                            .send(WatchPathCommit {
                                commit: Commit::from_bytes(Vec::new()),
                                changes: Vec::new(),
                                error: Some(e),
                            })
                            .await;
                        return;
                    }
                }
            }
        });

        WatchPathStream { receiver: Some(rx) }
    }

    /// Receive the next commit record. `None` once the watch has closed.
    pub async fn next(&mut self) -> Option<WatchPathCommit> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Stop watching and release the connection. Idempotent.
    pub fn close(&mut self) {
        self.receiver = None;
    }
}

impl Stream for WatchPathStream {
    type Item = WatchPathCommit;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

/// Decode one `[commitHex, value]` entry of a single-key watch message.
fn decode_pair(raw: &RawValue) -> Result<CommitValuePair> {
    let (commit_hex, value): (String, Value) = serde_json::from_str(raw.get())?;
    Ok(CommitValuePair {
        commit: Commit::from_hex(&commit_hex)?,
        value,
    })
}

/// Decode a `[commitHex, [[changeKind, path], ...]]` subtree-watch message.
/// A failure at any level sets the record's error field, keeping whatever
/// decoded before it.
fn decode_path_commit(reply: &StreamReply) -> WatchPathCommit {
    let mut record = WatchPathCommit {
        commit: Commit::from_bytes(Vec::new()),
        changes: Vec::new(),
        error: None,
    };

    if !reply.error.is_empty() {
        record.error = Some(CanopyError::Server(reply.error.to_string()));
        return record;
    }

    let (commit_hex, raw_changes): (String, Box<RawValue>) =
        match serde_json::from_str(reply.result.get()) {
            Ok(outer) => outer,
            Err(e) => {
                record.error = Some(e.into());
                return record;
            }
        };

    match Commit::from_hex(&commit_hex) {
        Ok(commit) => record.commit = commit,
        Err(e) => {
            record.error = Some(e);
            return record;
        }
    }

    let entries: Vec<Box<RawValue>> = match serde_json::from_str(raw_changes.get()) {
        Ok(entries) => entries,
        Err(e) => {
            record.error = Some(e.into());
            return record;
        }
    };
    for entry in entries {
        match serde_json::from_str::<(ChangeKind, Path)>(entry.get()) {
            Ok((kind, key)) => record.changes.push(PathChange { kind, key }),
            Err(e) => {
                record.error = Some(e.into());
                return record;
            }
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(result: &str) -> StreamReply {
        StreamReply {
            error: Value::default(),
            result: RawValue::from_string(result.to_string()).unwrap(),
        }
    }

    #[test]
    fn decodes_commit_value_pair() {
        let raw = RawValue::from_string(r#"["ab12","foo"]"#.to_string()).unwrap();
        let pair = decode_pair(&raw).unwrap();
        assert_eq!(pair.commit.as_bytes(), &[0xab, 0x12]);
        assert_eq!(pair.value.as_bytes(), b"foo");
    }

    #[test]
    fn pair_with_bad_hex_fails() {
        let raw = RawValue::from_string(r#"["zz","foo"]"#.to_string()).unwrap();
        assert!(decode_pair(&raw).is_err());
    }

    #[test]
    fn decodes_subtree_commit() {
        let record = decode_path_commit(&reply(r#"["ab12",[["+","/a/b"],["-","/c"]]]"#));
        assert!(record.error.is_none());
        assert_eq!(record.commit.to_hex(), "ab12");
        assert_eq!(record.changes.len(), 2);
        assert_eq!(record.changes[0].kind, ChangeKind::Created);
        assert_eq!(record.changes[0].key, Path::parse("/a/b"));
        assert_eq!(record.changes[1].kind, ChangeKind::Deleted);
    }

    #[test]
    fn subtree_bad_change_kind_sets_error_and_keeps_prefix() {
        let record = decode_path_commit(&reply(r#"["ab12",[["+","/a"],["?","/b"]]]"#));
        assert!(record.is_err());
        assert_eq!(record.commit.to_hex(), "ab12");
        assert_eq!(record.changes.len(), 1);
    }

    #[test]
    fn subtree_bad_commit_sets_error() {
        let record = decode_path_commit(&reply(r#"["zz",[]]"#));
        assert!(record.is_err());
        assert!(record.commit.as_bytes().is_empty());
    }

    #[test]
    fn subtree_server_error_sets_error() {
        let record = decode_path_commit(&StreamReply {
            error: Value::from("conflict"),
            result: RawValue::from_string("null".to_string()).unwrap(),
        });
        assert!(record.is_err());
    }

    #[tokio::test]
    async fn watch_close_is_idempotent() {
        let (_tx, rx) = mpsc::channel(1);
        let mut watch = WatchStream { receiver: Some(rx) };
        watch.close();
        watch.close();
        assert!(watch.next().await.is_none());
    }
}

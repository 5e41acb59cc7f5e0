#![warn(missing_docs)]

//! # canopy-client: a typed client for the Canopy store
//!
//! This crate binds the HTTP REST interface of a remote Canopy store (a
//! content-addressed, versioned key/value store with branching and merging)
//! to typed async Rust operations: read, update, remove, list, watch,
//! branch/clone, and view-based transactions.
//!
//! The store itself owns all the interesting semantics; this client
//! marshals requests, transports them, and decodes replies, including
//! long-lived streamed replies for watches and key iteration.
//!
//! ## Key Features
//!
//! - **Typed command surface**: values, paths, commits and tasks instead of
//!   raw JSON
//! - **Streaming watches**: long-lived change notifications for a single key
//!   or a whole subtree, decoded incrementally on a background task
//! - **Branch positioning**: run any command against a named branch
//! - **Views**: detached transactions updated independently and merged back
//! - **Bounded delivery**: stream consumers apply backpressure through small
//!   bounded channels; dropping a consumer releases its connection
//!
//! ## Watching a key
//!
//! ```ignore
//! use canopy_client::{CanopyClient, Path};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CanopyClient::new(Url::parse("http://127.0.0.1:8080")?, "watcher");
//!
//!     let mut watch = client.watch(&Path::parse("/config/flags"), None).await?;
//!     while let Some(update) = watch.next().await {
//!         println!("commit {}: {}", update.commit, update.value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Watching a subtree
//!
//! ```ignore
//! let mut watch = client.watch_path(&Path::parse("/config"), None).await?;
//! while let Some(record) = watch.next().await {
//!     if let Some(err) = &record.error {
//!         eprintln!("watch closed abnormally: {err}");
//!         break;
//!     }
//!     for change in &record.changes {
//!         println!("{} {} at {}", change.kind, change.key, record.commit);
//!     }
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[types]** - Core data model (Value, Path, Commit, Task, watch records)
//! - **[error]** - Error types and result handling
//! - **[client]** - The client: commands, transport, stream decoding, watches
//! - **[protocol]** - Wire constants and reply envelopes

pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::{
    CanopyClient, ClientConfig, KeyStream, ReplyStream, View, WatchPathStream, WatchStream,
};
pub use error::{CanopyError, Result};
pub use protocol::reply::StreamReply;
pub use types::{
    ChangeKind, Commit, CommitValuePair, Path, PathChange, Task, Value, WatchPathCommit,
};

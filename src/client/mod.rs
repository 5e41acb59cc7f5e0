//! HTTP client for the Canopy REST API.
//!
//! This module provides the full client surface: unary store commands, the
//! streaming reply decoder, and the watch subsystem layered on top of it.
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── commands  - CanopyClient, URL building and unary commands
//! ├── view      - View (transaction) commands
//! ├── transport - Request issuing (buffered calls / streaming opens)
//! ├── parser    - Incremental stream-framing parser
//! ├── stream    - ReplyStream / KeyStream delivery over background tasks
//! ├── watch     - WatchStream / WatchPathStream typed notifications
//! ├── config    - Client configuration
//! └── utils     - Retry helpers
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CanopyClient`] | Main client handle |
//! | [`ReplyStream`] | Raw decoded reply sequence from one open stream |
//! | [`WatchStream`] | Single-key change notifications |
//! | [`WatchPathStream`] | Subtree change notifications |
//! | [`KeyStream`] | Streamed key enumeration |
//! | [`View`] | Detached transaction |
//! | [`ClientConfig`] | Client configuration options |
//!
//! # Concurrency model
//!
//! Every open stream owns its own connection, parser state and delivery
//! channel, driven by one background task; concurrently open streams share
//! nothing and need no coordination. Values are delivered in arrival order
//! over bounded channels, so production is paced by the consumer. Dropping a
//! consumer handle releases the stream's connection without an explicit
//! unsubscribe.

mod commands;
mod config;
mod parser;
mod stream;
mod transport;
mod utils;
mod view;
mod watch;

pub use commands::CanopyClient;
pub use config::ClientConfig;
pub use parser::{ParseState, StreamEvent, StreamParser};
pub use stream::{KeyStream, ReplyStream};
pub use utils::{exponential_backoff, is_retryable_status};
pub use view::View;
pub use watch::{WatchPathStream, WatchStream};

//! Error types and result handling.
//!
//! All fallible operations in this crate return [`Result`], an alias for
//! `std::result::Result<T, CanopyError>`.
//!
//! Errors discovered while setting up a request or opening a stream are
//! returned synchronously. Errors discovered after a stream has been handed
//! to the caller are delivered in-band (subtree watches, key iteration) or
//! logged and skipped (single-key watches); background tasks never panic.

use thiserror::Error;

/// Errors produced by the Canopy client.
#[derive(Debug, Error)]
pub enum CanopyError {
    /// The HTTP request could not be issued or the connection failed.
    #[error("http request failed: {0}")]
    Http(String),

    /// The server answered with a non-2xx status code.
    #[error("server returned status {0}")]
    Status(u16),

    /// The streamed response body violated the expected framing.
    #[error("malformed stream: {0}")]
    Framing(String),

    /// A reply could not be decoded as JSON.
    #[error("failed to decode reply: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server reported an error in a reply envelope.
    #[error("server error: {0}")]
    Server(String),

    /// A commit hash was not valid hex.
    #[error("invalid commit hash: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A path segment carried a malformed percent-escape.
    #[error("invalid path encoding: {0}")]
    PathEncoding(String),

    /// The server reply had an unexpected shape (e.g. multiple results where
    /// one was expected).
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// A value read as a string did not contain valid UTF-8.
    #[error("value at {0} is not valid utf-8")]
    NotUtf8(String),

    /// A command URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type used throughout the crate.
pub type Result<T, E = CanopyError> = std::result::Result<T, E>;

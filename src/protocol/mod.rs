//! Wire-protocol constants and reply envelopes for the Canopy REST API.
//!
//! # Reply framing
//!
//! Unary commands answer with a single JSON envelope:
//!
//! ```json
//! {"error": "", "result": ..., "version": "..."}
//! ```
//!
//! Streaming commands answer with a JSON array framed by sentinel objects:
//!
//! ```json
//! [ {"stream": "start"}, {"version": "..."},
//!   {"error": "", "result": ...}, ...,
//!   {"stream": "end"} ]
//! ```
//!
//! See [`reply`] for the envelope types and [`constants`] for command names
//! and sentinel tokens.

pub mod reply;

/// Protocol constants: command names, stream sentinels and change tokens.
pub mod constants {
    /// REST command names, appended to the base URL (optionally under a
    /// `branch/<name>/` prefix).
    pub mod commands {
        /// List the keys under a path.
        pub const LIST: &str = "list";
        /// Key existence check.
        pub const MEM: &str = "mem";
        /// Read a key's value.
        pub const READ: &str = "read";
        /// Commit hash of HEAD.
        pub const HEAD: &str = "head";
        /// Write a key.
        pub const UPDATE: &str = "update";
        /// Remove a key.
        pub const REMOVE: &str = "remove";
        /// Remove a key and its subtree.
        pub const REMOVE_REC: &str = "remove-rec";
        /// Streamed enumeration of all keys.
        pub const ITER: &str = "iter";
        /// Clone the current branch under a new name.
        pub const CLONE: &str = "clone";
        /// Clone, overwriting an existing branch of the same name.
        pub const CLONE_FORCE: &str = "clone-force";
        /// Conditional write.
        pub const COMPARE_AND_SET: &str = "compare-and-set";
        /// Watch a single key.
        pub const WATCH: &str = "watch";
        /// Watch a subtree recursively.
        pub const WATCH_REC: &str = "watch-rec";
        /// Prefix segment selecting a named branch.
        pub const BRANCH: &str = "branch";
        /// Prefix segment for view (transaction) commands.
        pub const VIEW: &str = "view";
        /// Create a view from a path.
        pub const VIEW_CREATE: &str = "view/create";
    }

    /// Stream sentinel tokens.
    pub mod stream {
        /// Value of the opening sentinel object's `stream` field.
        pub const START: &str = "start";
        /// Value of the closing sentinel object's `stream` field.
        pub const END: &str = "end";
        /// Opaque second element of a single-key watch resume body; the
        /// server ignores its content.
        pub const RESUME_MARKER: &str = "watch";
    }
}

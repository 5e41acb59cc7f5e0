//! Typed change notifications delivered by watch streams.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CanopyError;
use crate::types::{Commit, Path, Value};

/// One observed update to a single watched key: the commit that produced it
/// and the value at that commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitValuePair {
    /// Commit that produced the update.
    pub commit: Commit,
    /// Value observed at that commit.
    pub value: Value,
}

/// The kind of change a subtree watch reports for a key.
///
/// Wire form is a single token: `+` created, `*` updated, `-` deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The key was created.
    #[serde(rename = "+")]
    Created,
    /// The key's value was updated.
    #[serde(rename = "*")]
    Updated,
    /// The key was deleted.
    #[serde(rename = "-")]
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            ChangeKind::Created => "+",
            ChangeKind::Updated => "*",
            ChangeKind::Deleted => "-",
        };
        f.write_str(token)
    }
}

/// A single key change within a [`WatchPathCommit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathChange {
    /// What happened to the key.
    pub kind: ChangeKind,
    /// The affected key.
    pub key: Path,
}

/// One commit observed by a subtree watch: the commit identifier and the
/// ordered list of key changes it carries.
///
/// A record whose [`error`](WatchPathCommit::error) field is set is terminal:
/// it is the last record the watch delivers and may carry whatever part of the
/// message decoded before the failure. Callers distinguish a clean close from
/// an abnormal one by checking the final record's error field.
#[derive(Debug)]
pub struct WatchPathCommit {
    /// Commit that produced the changes. Empty when the commit itself failed
    /// to decode.
    pub commit: Commit,
    /// Ordered key changes within the commit.
    pub changes: Vec<PathChange>,
    /// Set on the terminal record of an abnormally closed watch.
    pub error: Option<CanopyError>,
}

impl WatchPathCommit {
    /// True when this is the terminal record of a failed watch.
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_wire_tokens() {
        assert_eq!(serde_json::to_string(&ChangeKind::Created).unwrap(), r#""+""#);
        assert_eq!(serde_json::to_string(&ChangeKind::Updated).unwrap(), r#""*""#);
        assert_eq!(serde_json::to_string(&ChangeKind::Deleted).unwrap(), r#""-""#);

        let k: ChangeKind = serde_json::from_str(r#""-""#).unwrap();
        assert_eq!(k, ChangeKind::Deleted);
        assert!(serde_json::from_str::<ChangeKind>(r#""?""#).is_err());
    }

    #[test]
    fn change_pair_decodes_from_wire_tuple() {
        let (kind, key): (ChangeKind, Path) =
            serde_json::from_str(r#"["+","/a/b"]"#).unwrap();
        assert_eq!(kind, ChangeKind::Created);
        assert_eq!(key, Path::parse("/a/b"));
    }
}

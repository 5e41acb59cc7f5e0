//! Commit metadata attached to mutating requests.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Metadata recorded with a commit: timestamp, author identity and free-text
/// messages.
///
/// A task is built fresh for each mutating call and is not retained after the
/// request completes. The `date` field is the Unix timestamp in seconds,
/// rendered as a decimal string as the server expects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Unix timestamp in seconds, as a decimal string.
    pub date: String,
    /// Author uid; `"0"` unless the caller tracks identities.
    pub uid: String,
    /// Commit author.
    pub owner: Value,
    /// Free-text commit messages.
    pub messages: Vec<Value>,
}

impl Task {
    /// Create a task for `owner` with a single commit message, stamped with
    /// the current time.
    pub fn new(owner: &str, message: &str) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Task {
            date: secs.to_string(),
            uid: "0".to_string(),
            owner: Value::from(owner),
            messages: vec![Value::from(message)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_field_names() {
        let t = Task {
            date: "100".into(),
            uid: "0".into(),
            owner: Value::from("alice"),
            messages: vec![Value::from("msg")],
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(
            json,
            r#"{"date":"100","uid":"0","owner":"alice","messages":["msg"]}"#
        );
    }

    #[test]
    fn new_stamps_current_time() {
        let t = Task::new("bob", "hello");
        assert!(t.date.parse::<u64>().unwrap() > 0);
        assert_eq!(t.owner.as_bytes(), b"bob");
    }
}

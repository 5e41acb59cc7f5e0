//! Reply envelopes and request bodies.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{CanopyError, Result};
use crate::types::{Task, Value};

/// One decoded unit from an open stream.
///
/// Carries the server's error value (empty when absent) and the raw,
/// not-yet-interpreted result payload. Higher layers decode `result` into
/// typed notifications; see [`crate::client::ReplyStream`].
#[derive(Debug)]
pub struct StreamReply {
    /// Server-reported error, empty when the reply succeeded.
    pub error: Value,
    /// Raw JSON result payload.
    pub result: Box<RawValue>,
}

/// Envelope of a unary command reply: `{"error", "result", "version"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub version: Value,
}

impl<T> Envelope<T> {
    /// Surface a server-reported error, otherwise hand back the envelope.
    pub fn checked(self) -> Result<Self> {
        if self.error.is_empty() {
            Ok(self)
        } else {
            Err(CanopyError::Server(self.error.to_string()))
        }
    }
}

/// Body of a mutating request: the commit task plus optional command
/// parameters.
#[derive(Debug, Serialize)]
pub(crate) struct CommandRequest {
    pub task: Task,
    #[serde(rename = "params", skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A stream sentinel object: `{"stream": "start"}` / `{"stream": "end"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamToken {
    pub stream: Value,
}

/// The version announcement following the start sentinel.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionToken {
    pub version: Value,
}

/// A raw stream element before interpretation.
#[derive(Debug, Deserialize)]
pub(crate) struct WireReply {
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
}

/// Error object a server may return in place of a stream.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorVersion {
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    #[allow(dead_code)]
    pub version: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Path;

    #[test]
    fn envelope_decodes_result_variants() {
        let e: Envelope<Vec<Value>> =
            serde_json::from_str(r#"{"error":"","result":["a"],"version":"v1"}"#).unwrap();
        assert_eq!(e.result.unwrap().len(), 1);
        assert_eq!(e.version.as_bytes(), b"v1");

        let e: Envelope<bool> = serde_json::from_str(r#"{"result":true}"#).unwrap();
        assert_eq!(e.result, Some(true));

        let e: Envelope<Vec<Path>> =
            serde_json::from_str(r#"{"error":"","result":[["a","b"]]}"#).unwrap();
        assert_eq!(e.result.unwrap()[0], Path::parse("/a/b"));
    }

    #[test]
    fn envelope_checked_surfaces_server_error() {
        let e: Envelope<bool> = serde_json::from_str(r#"{"error":"denied"}"#).unwrap();
        match e.checked() {
            Err(CanopyError::Server(msg)) => assert_eq!(msg, "denied"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn command_request_omits_absent_params() {
        let req = CommandRequest {
            task: Task {
                date: "1".into(),
                uid: "0".into(),
                owner: Value::from("o"),
                messages: vec![],
            },
            params: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("params"));
    }

    #[test]
    fn wire_reply_without_result_decodes_to_none() {
        let r: WireReply = serde_json::from_str(r#"{"stream":"end"}"#).unwrap();
        assert!(r.result.is_none());
        assert!(r.error.is_empty());
    }
}

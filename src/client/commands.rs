//! The main client handle and its command surface.
//!
//! [`CanopyClient`] resolves command URLs against the store's base URL,
//! issues unary commands (list, read, update, ...) through the transport, and
//! opens watch/iteration streams through the stream decoder.
//!
//! # Examples
//!
//! ```ignore
//! use canopy_client::{CanopyClient, Path};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CanopyClient::new(Url::parse("http://127.0.0.1:8080")?, "alice");
//!
//!     let key = Path::parse("/app/setting");
//!     let commit = client
//!         .update(client.new_task("set value"), &key, "fast")
//!         .await?;
//!     println!("committed {commit}");
//!
//!     let mut watch = client.watch(&key, None).await?;
//!     while let Some(update) = watch.next().await {
//!         println!("{} -> {}", update.commit, update.value);
//!     }
//!     Ok(())
//! }
//! ```

use serde::de::DeserializeOwned;
use url::Url;

use crate::client::config::ClientConfig;
use crate::client::stream::{KeyStream, ReplyStream};
use crate::client::transport::Transport;
use crate::client::watch::{WatchPathStream, WatchStream};
use crate::error::{CanopyError, Result};
use crate::protocol::constants::{commands, stream as sentinel};
use crate::protocol::reply::{CommandRequest, Envelope};
use crate::types::{escape_segment, Commit, Path, Task, Value};

/// Client handle for one Canopy store.
///
/// Holds the base URL, the branch position commands run under, the task owner
/// recorded as commit author, and the HTTP transport. Cheap to clone; clones
/// share the connection pool.
#[derive(Clone)]
pub struct CanopyClient {
    base: Url,
    branch: Option<String>,
    task_owner: String,
    transport: Transport,
}

impl CanopyClient {
    /// Create a client for the store at `base`, with `task_owner` recorded as
    /// the commit author on mutating commands.
    pub fn new(base: Url, task_owner: &str) -> Self {
        Self::with_config(base, task_owner, ClientConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(base: Url, task_owner: &str, config: ClientConfig) -> Self {
        CanopyClient {
            base,
            branch: None,
            task_owner: task_owner.to_string(),
            transport: Transport::new(config),
        }
    }

    /// A client positioned on the named branch: its commands run under
    /// `/branch/<name>/...`. An empty name selects the primary branch.
    pub fn on_branch(&self, name: &str) -> Self {
        let mut client = self.clone();
        client.branch = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        client
    }

    /// The branch this client is positioned on, if any.
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// The task owner recorded as commit author.
    pub fn task_owner(&self) -> &str {
        &self.task_owner
    }

    /// Change the task owner for subsequent tasks.
    pub fn set_task_owner(&mut self, owner: &str) {
        self.task_owner = owner.to_string();
    }

    /// Create a task (commit metadata) for a mutating command.
    pub fn new_task(&self, message: &str) -> Task {
        Task::new(&self.task_owner, message)
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    /// Build the invocation URL for a command at a path, honoring the branch
    /// position.
    pub(crate) fn call_url(&self, command: &str, path: &Path) -> Result<Url> {
        let suffix = match &self.branch {
            None => format!("/{}{}", command, path.url_path()),
            Some(branch) => format!(
                "/{}/{}/{}{}",
                commands::BRANCH,
                escape_segment(branch.as_bytes()),
                command,
                path.url_path()
            ),
        };
        Ok(self.base.join(&suffix)?)
    }

    pub(crate) async fn run_command<T: DeserializeOwned + Default>(
        &self,
        command: &str,
        path: &Path,
        body: Option<&CommandRequest>,
    ) -> Result<Envelope<T>> {
        let url = self.call_url(command, path)?;
        let body_json = match body {
            Some(body) => Some(serde_json::to_value(body)?),
            None => None,
        };
        self.transport.call(&url, body_json.as_ref()).await
    }

    pub(crate) async fn open_stream(
        &self,
        command: &str,
        path: &Path,
        body: Option<serde_json::Value>,
    ) -> Result<ReplyStream> {
        let url = self.call_url(command, path)?;
        let response = self.transport.open(&url, body.as_ref()).await?;
        ReplyStream::from_response(response).await
    }

    /// The server's version string.
    pub async fn version(&self) -> Result<String> {
        let data: Envelope<Vec<Value>> = self.run_command("", &Path::new(), None).await?;
        Ok(data.checked()?.version.to_string())
    }

    /// The commands the server advertises.
    pub async fn available_commands(&self) -> Result<Vec<String>> {
        let data: Envelope<Vec<Value>> = self.run_command("", &Path::new(), None).await?;
        Ok(data
            .checked()?
            .result
            .unwrap_or_default()
            .iter()
            .map(|v| v.to_string())
            .collect())
    }

    /// List the keys directly under `path`.
    pub async fn list(&self, path: &Path) -> Result<Vec<Path>> {
        let data: Envelope<Vec<Path>> = self.run_command(commands::LIST, path, None).await?;
        Ok(data.checked()?.result.unwrap_or_default())
    }

    /// True when a value exists at `path`.
    pub async fn mem(&self, path: &Path) -> Result<bool> {
        let data: Envelope<bool> = self.run_command(commands::MEM, path, None).await?;
        Ok(data.checked()?.result.unwrap_or(false))
    }

    /// Read the value at `path`.
    pub async fn read(&self, path: &Path) -> Result<Value> {
        let data: Envelope<Vec<Value>> = self.run_command(commands::READ, path, None).await?;
        let mut results = data.checked()?.result.unwrap_or_default();
        match results.len() {
            0 => Err(CanopyError::UnexpectedReply(format!("no value at {path}"))),
            1 => Ok(results.remove(0)),
            n => Err(CanopyError::UnexpectedReply(format!(
                "read {path} returned {n} results"
            ))),
        }
    }

    /// Read the value at `path` as a UTF-8 string.
    pub async fn read_string(&self, path: &Path) -> Result<String> {
        let value = self.read(path).await?;
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(CanopyError::NotUtf8(path.to_string())),
        }
    }

    /// The commit hash of HEAD, or `None` on an empty store.
    pub async fn head(&self) -> Result<Option<Commit>> {
        let data: Envelope<Vec<Value>> = self.run_command(commands::HEAD, &Path::new(), None).await?;
        let results = data.checked()?.result.unwrap_or_default();
        match results.len() {
            0 => Ok(None),
            1 => {
                let hex = results[0].as_str().ok_or_else(|| {
                    CanopyError::UnexpectedReply("head hash is not a string".to_string())
                })?;
                Ok(Some(Commit::from_hex(hex)?))
            }
            n => Err(CanopyError::UnexpectedReply(format!(
                "head returned {n} results"
            ))),
        }
    }

    /// Write `contents` at `path`, returning the new commit.
    pub async fn update(
        &self,
        task: Task,
        path: &Path,
        contents: impl Into<Value>,
    ) -> Result<Commit> {
        let value = contents.into();
        let body = CommandRequest {
            task,
            params: Some(serde_json::to_value(&value)?),
        };
        let data: Envelope<Value> = self.run_command(commands::UPDATE, path, Some(&body)).await?;
        let hash = data.checked()?.result.unwrap_or_default();
        commit_from_result(&hash, || format!("update {path} returned no hash"))
    }

    /// Remove the key at `path`.
    pub async fn remove(&self, task: Task, path: &Path) -> Result<()> {
        let body = CommandRequest { task, params: None };
        let data: Envelope<Value> = self.run_command(commands::REMOVE, path, Some(&body)).await?;
        data.checked()?;
        Ok(())
    }

    /// Remove the key at `path` and its whole subtree.
    pub async fn remove_rec(&self, task: Task, path: &Path) -> Result<()> {
        let body = CommandRequest { task, params: None };
        let data: Envelope<Value> =
            self.run_command(commands::REMOVE_REC, path, Some(&body)).await?;
        let result = data.checked()?.result.unwrap_or_default();
        if result.is_empty() {
            return Err(CanopyError::UnexpectedReply(format!(
                "remove-rec {path} returned empty result"
            )));
        }
        Ok(())
    }

    /// Clone the current branch under `name`. With `force`, an existing
    /// branch of that name is overwritten.
    pub async fn clone_branch(&self, task: Task, name: &str, force: bool) -> Result<()> {
        let command = if force {
            commands::CLONE_FORCE
        } else {
            commands::CLONE
        };
        let path = Path::from_segments(vec![Value::from(name)]);
        let body = CommandRequest { task, params: None };
        let data: Envelope<Value> = self.run_command(command, &path, Some(&body)).await?;
        let result = data.checked()?.result.unwrap_or_default();
        if result.as_bytes() != b"ok" {
            return Err(CanopyError::UnexpectedReply(format!(
                "clone {name} returned {result}"
            )));
        }
        Ok(())
    }

    /// Write `new` at `path` only if the current value equals `old`.
    /// `None` stands for an absent value on either side.
    pub async fn compare_and_set(
        &self,
        task: Task,
        path: &Path,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<Commit> {
        let body = CommandRequest {
            task,
            params: Some(serde_json::json!([[old], [new]])),
        };
        let data: Envelope<Value> =
            self.run_command(commands::COMPARE_AND_SET, path, Some(&body)).await?;
        let hash = data.checked()?.result.unwrap_or_default();
        commit_from_result(&hash, || format!("compare-and-set {path} returned no hash"))
    }

    /// Enumerate every key in the store as a stream.
    pub async fn iter(&self) -> Result<KeyStream> {
        let replies = self.open_stream(commands::ITER, &Path::new(), None).await?;
        Ok(KeyStream::spawn(replies))
    }

    /// Watch a single key.
    ///
    /// With a `resume` commit the server replays history from that point.
    /// See [`WatchStream`] for the delivery and error-skipping contract.
    pub async fn watch(&self, path: &Path, resume: Option<&Commit>) -> Result<WatchStream> {
        let body = resume.map(|c| serde_json::json!([c.to_hex(), sentinel::RESUME_MARKER]));
        let replies = self.open_stream(commands::WATCH, path, body).await?;
        Ok(WatchStream::spawn(replies, path.clone()))
    }

    /// Watch a subtree recursively.
    ///
    /// With a `resume` commit the server replays history from that point.
    /// See [`WatchPathStream`] for the delivery and terminal-error contract.
    pub async fn watch_path(&self, path: &Path, resume: Option<&Commit>) -> Result<WatchPathStream> {
        let body = resume.map(|c| serde_json::json!([c.to_hex()]));
        let replies = self.open_stream(commands::WATCH_REC, path, body).await?;
        Ok(WatchPathStream::spawn(replies))
    }
}

/// Decode a hash carried in a command result.
fn commit_from_result(result: &Value, context: impl Fn() -> String) -> Result<Commit> {
    let hex = result
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CanopyError::UnexpectedReply(context()))?;
    Commit::from_hex(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CanopyClient {
        CanopyClient::new(Url::parse("http://127.0.0.1:8080").unwrap(), "tester")
    }

    #[test]
    fn call_url_appends_command_and_path() {
        let url = client()
            .call_url(commands::READ, &Path::parse("/a/b"))
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/read/a/b");
    }

    #[test]
    fn call_url_for_root_command() {
        let url = client().call_url("", &Path::new()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn call_url_with_branch_prefix() {
        let url = client()
            .on_branch("dev branch")
            .call_url(commands::LIST, &Path::parse("/k"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/branch/dev%20branch/list/k"
        );
    }

    #[test]
    fn call_url_escapes_path_segments() {
        let mut path = Path::new();
        path.push("a/b");
        let url = client().call_url(commands::READ, &path).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/read/a%2Fb");
    }

    #[test]
    fn empty_branch_selects_primary() {
        let c = client().on_branch("dev").on_branch("");
        assert_eq!(c.branch(), None);
    }

    #[test]
    fn new_task_uses_owner() {
        let task = client().new_task("message");
        assert_eq!(task.owner.as_bytes(), b"tester");
        assert_eq!(task.messages.len(), 1);
    }
}

//! View-based transactions.
//!
//! A [`View`] is a detached working copy created from a path. Reads and
//! updates run against the view's own node, independent of the branch it was
//! created from, until the view is merged back with
//! [`merge_path`](View::merge_path) or written out with
//! [`update_path`](View::update_path).

use crate::client::commands::CanopyClient;
use crate::client::stream::KeyStream;
use crate::error::{CanopyError, Result};
use crate::protocol::constants::commands;
use crate::protocol::reply::{CommandRequest, Envelope};
use crate::types::{escape_segment, Path, Task, Value};

/// A detached transaction created from a path.
pub struct View {
    client: CanopyClient,
    head: String,
    node: String,
    path: Path,
}

impl CanopyClient {
    /// Create a view (transaction) rooted at `path`.
    pub async fn create_view(&self, task: Task, path: &Path) -> Result<View> {
        let body = CommandRequest { task, params: None };
        let data: Envelope<Value> =
            self.run_command(commands::VIEW_CREATE, path, Some(&body)).await?;
        let result = data.checked()?.result.unwrap_or_default();
        let text = result.as_str().ok_or_else(|| {
            CanopyError::UnexpectedReply("view id is not a string".to_string())
        })?;

        // The server answers with "<head>-<node>".
        let (head, node) = text.split_once('-').ok_or_else(|| {
            CanopyError::UnexpectedReply(format!("invalid view id {text:?}"))
        })?;
        if head.is_empty() || node.is_empty() {
            return Err(CanopyError::UnexpectedReply(format!(
                "invalid view id {text:?}"
            )));
        }

        Ok(View {
            client: self.clone(),
            head: head.to_string(),
            node: node.to_string(),
            path: path.clone(),
        })
    }
}

impl View {
    /// The path the view was created from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a task for a mutating view command.
    pub fn new_task(&self, message: &str) -> Task {
        Task::new(self.client.task_owner(), message)
    }

    /// Read a value from the view.
    pub async fn read(&self, path: &Path) -> Result<Value> {
        let data: Envelope<Value> = self
            .client
            .run_command(&self.command(commands::READ), path, None)
            .await?;
        Ok(data.checked()?.result.unwrap_or_default())
    }

    /// Read a value from the view as a UTF-8 string.
    pub async fn read_string(&self, path: &Path) -> Result<String> {
        let value = self.read(path).await?;
        match value.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(CanopyError::NotUtf8(path.to_string())),
        }
    }

    /// Write a value into the view, advancing its node position. Returns the
    /// new node identifier.
    pub async fn update(
        &mut self,
        task: Task,
        path: &Path,
        contents: impl Into<Value>,
    ) -> Result<String> {
        let value = contents.into();
        let body = CommandRequest {
            task,
            params: Some(serde_json::to_value(&value)?),
        };
        let data: Envelope<Value> = self
            .client
            .run_command(&self.command(commands::UPDATE), path, Some(&body))
            .await?;
        let result = data.checked()?.result.unwrap_or_default();
        let node = result.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
            CanopyError::UnexpectedReply(format!("view update {path} returned no node"))
        })?;

        self.node = node.to_string();
        Ok(self.node.clone())
    }

    /// Merge the view into `branch` (the primary branch when `None`) at the
    /// given path.
    pub async fn merge_path(&self, task: Task, branch: Option<&str>, path: &Path) -> Result<()> {
        let body = CommandRequest {
            task,
            // The view's base head rides along so the server can detect
            // concurrent updates.
            params: Some(serde_json::to_value(Value::from(self.head.as_str()))?),
        };
        let command = self.branch_command(branch, "merge-path");
        let data: Envelope<Value> = self.client.run_command(&command, path, Some(&body)).await?;
        data.checked()?;
        Ok(())
    }

    /// Write the view into `branch` (the primary branch when `None`) at the
    /// given path, overwriting existing values.
    pub async fn update_path(&self, task: Task, branch: Option<&str>, path: &Path) -> Result<()> {
        let body = CommandRequest { task, params: None };
        let command = self.branch_command(branch, "update-path");
        let data: Envelope<Value> = self.client.run_command(&command, path, Some(&body)).await?;
        let result = data.checked()?.result.unwrap_or_default();
        if result.is_empty() {
            return Err(CanopyError::UnexpectedReply(format!(
                "update-path {path} returned no hash"
            )));
        }
        Ok(())
    }

    /// Enumerate the keys in the view as a stream.
    pub async fn iter(&self) -> Result<KeyStream> {
        let replies = self
            .client
            .open_stream(&self.command(commands::ITER), &Path::new(), None)
            .await?;
        Ok(KeyStream::spawn(replies))
    }

    fn command(&self, op: &str) -> String {
        format!(
            "{}/{}/{}",
            commands::VIEW,
            escape_segment(self.node.as_bytes()),
            op
        )
    }

    fn branch_command(&self, branch: Option<&str>, op: &str) -> String {
        match branch {
            Some(name) => format!(
                "{}/{}/{}",
                commands::BRANCH,
                escape_segment(name.as_bytes()),
                self.command(op)
            ),
            None => self.command(op),
        }
    }
}

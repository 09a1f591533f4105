//! Tasks and batches: the client-side view of one submission.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::api::SubmittedTask;

/// Opaque identifier the server assigns to one file's processing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Processing status of a task as reported by the server.
///
/// Only `SUCCESS` and `FAILED` are terminal. Every other label the server may
/// send (`PROCESSING`, `STARTED`, `RETRY`, ...) is kept verbatim in `Other`
/// and keeps the task in the polling set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
    Other(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => Self::Pending,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Other(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file's processing job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    /// Absolute URL of the task's result endpoint.
    pub result_url: String,
    pub status: TaskStatus,
}

/// The tasks created by one submission, in submission order.
///
/// Task ids are unique within a batch. The index of a task is the link to its
/// row in a front end; `generation` tells events of this batch apart from
/// events of batches it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    generation: u64,
    tasks: Vec<Task>,
}

/// A single task's status as observed in one poll round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub index: usize,
    pub task_id: TaskId,
    pub status: TaskStatus,
}

impl Batch {
    /// Build a batch from tasks, rejecting duplicate ids.
    pub fn new(generation: u64, tasks: Vec<Task>) -> Result<Self, CoreError> {
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(CoreError::DuplicateTask(task.id.clone()));
            }
        }
        Ok(Self { generation, tasks })
    }

    /// Build a batch from the submit response, resolving each result URL
    /// against `base_url`.
    pub fn from_submission(
        generation: u64,
        base_url: &str,
        submitted: Vec<SubmittedTask>,
    ) -> Result<Self, CoreError> {
        let tasks = submitted
            .into_iter()
            .map(|entry| Task {
                result_url: resolve_url(base_url, &entry.url_result),
                id: entry.task_id,
                status: entry.status,
            })
            .collect();
        Self::new(generation, tasks)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    /// Number of tasks in a terminal state.
    pub fn terminal_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_terminal()).count()
    }

    /// True once every task is terminal. An empty batch is complete.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Tasks still worth polling, with their indices.
    pub fn pending(&self) -> impl Iterator<Item = (usize, &Task)> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.status.is_terminal())
    }

    /// Apply an observed status. Returns true if the stored status changed.
    ///
    /// Updates are matched by id as well as index, so an update that does not
    /// belong to this batch is ignored. A terminal status is final.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        match self.tasks.get_mut(update.index) {
            Some(task) if task.id == update.task_id => {
                if task.status.is_terminal() || task.status == update.status {
                    false
                } else {
                    task.status = update.status.clone();
                    true
                }
            }
            _ => false,
        }
    }
}

/// Resolve a server-relative path against the API base URL.
///
/// Absolute URLs are returned unchanged.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

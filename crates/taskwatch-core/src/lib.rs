use std::time::Duration;

use thiserror::Error;

pub mod api;
pub mod config;
mod poller;
mod result;
mod task;

pub use api::{HttpTaskApi, SubmittedTask, TaskApi, UploadFile};
pub use config::{FileConfig, Overrides};
pub use poller::{PollEvent, PollHandle, RoundSummary, TaskPoller};
pub use result::TaskResult;
pub use task::{Batch, StatusUpdate, Task, TaskId, TaskStatus, resolve_url};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no files to submit")]
    NoFiles,
    #[error("duplicate task id in submission: {0}")]
    DuplicateTask(TaskId),
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
    #[error("result for {task_id} not ready or already consumed (status {status})")]
    ResultNotReady { task_id: TaskId, status: String },
    #[error("polling task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Configuration for talking to the processing API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// API root without a trailing slash, e.g. `http://localhost:8000`.
    pub base_url: String,
    pub poll_interval: Duration,
    /// Upper bound for a single request, also the per-task bound in a poll round.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

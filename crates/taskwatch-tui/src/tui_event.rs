use std::path::PathBuf;

use taskwatch_core::{PollEvent, StatusUpdate, TaskId, TaskResult, TaskStatus};

/// Commands flowing from the TUI to the backend task.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Upload the configured files as a new batch, replacing the current one.
    Submit,
    /// Run one manual poll round on the current batch.
    Refresh,
    /// Fetch the result of a task in the current batch.
    View(TaskId),
    /// Save the annotated image of a fetched result.
    Download(TaskResult),
}

/// Events flowing from the backend task to the TUI.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A submission is about to be sent.
    SubmitStarted { file_count: usize },
    /// The server accepted the files and created tasks.
    Submitted {
        generation: u64,
        tasks: Vec<(TaskId, TaskStatus)>,
    },
    /// The submission failed; there is no batch.
    SubmitFailed { error: String },
    /// Event from the running poll.
    Poll(PollEvent),
    /// Status changes found by a manual refresh.
    Refreshed {
        generation: u64,
        updates: Vec<StatusUpdate>,
    },
    /// A task's result was fetched.
    ResultReady { generation: u64, result: TaskResult },
    /// A task's result could not be shown.
    ResultUnavailable {
        generation: u64,
        task_id: TaskId,
        message: String,
    },
    /// An annotated image was written to disk.
    Downloaded { task_id: TaskId, path: PathBuf },
    DownloadFailed { task_id: TaskId, message: String },
}

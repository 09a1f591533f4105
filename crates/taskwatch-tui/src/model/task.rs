use taskwatch_core::{TaskId, TaskStatus};

/// Lifecycle of the current submission as shown in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Submitting,
    Polling,
    Complete,
    SubmitFailed(String),
}

impl BatchPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Submitting => "Submitting...",
            Self::Polling => "Polling...",
            Self::Complete => "Done",
            Self::SubmitFailed(_) => "Submit failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }
}

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

impl TaskRow {
    pub fn new(task_id: TaskId, status: TaskStatus) -> Self {
        Self { task_id, status }
    }

    /// The view action is only offered once the task is terminal.
    pub fn is_viewable(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn view_label(&self) -> &'static str {
        if self.is_viewable() { "[View]" } else { "" }
    }
}

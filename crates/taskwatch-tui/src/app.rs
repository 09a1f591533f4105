use taskwatch_core::{PollEvent, StatusUpdate, TaskId, TaskResult, TaskStatus};

use crate::action::Action;
use crate::model::task::{BatchPhase, TaskRow};
use crate::theme::Theme;
use crate::tui_event::{BackendEvent, Command};

/// Which screen is currently displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Tasks,
    Detail,
}

/// Main application state.
pub struct App {
    pub screen: Screen,
    pub base_url: String,
    pub file_names: Vec<String>,
    pub phase: BatchPhase,
    /// Generation of the batch the rows belong to; events for any other
    /// generation are stale and ignored.
    pub generation: Option<u64>,
    /// Rows in submission order, indexed like the batch's tasks.
    pub rows: Vec<TaskRow>,
    pub cursor: usize,
    /// Result shown on the detail screen, replaced on every view request.
    pub detail: Option<TaskResult>,
    /// Blocking message; input other than dismiss/quit is swallowed while set.
    pub alert: Option<String>,
    /// Outcome of the last download, shown on the detail screen.
    pub notice: Option<String>,
    pub tick: usize,
    pub theme: Theme,
    pub should_quit: bool,
    pub show_help: bool,
    pub detail_scroll: u16,
    /// Height of the visible table area (set on resize, used for page up/down).
    pub visible_rows: usize,
}

impl App {
    pub fn new(base_url: String, file_names: Vec<String>) -> Self {
        Self {
            screen: Screen::Tasks,
            base_url,
            file_names,
            phase: BatchPhase::Idle,
            generation: None,
            rows: Vec::new(),
            cursor: 0,
            detail: None,
            alert: None,
            notice: None,
            tick: 0,
            theme: Theme::hacker(),
            should_quit: false,
            show_help: false,
            detail_scroll: 0,
            visible_rows: 20,
        }
    }

    /// Number of rows in a terminal state.
    pub fn terminal_count(&self) -> usize {
        self.rows.iter().filter(|r| r.status.is_terminal()).count()
    }

    /// Process a user action and update state.
    ///
    /// Returns the command to send to the backend, if any.
    pub fn update(&mut self, action: Action) -> Option<Command> {
        if matches!(action, Action::Quit) {
            self.should_quit = true;
            return None;
        }
        if let Action::Tick = action {
            self.tick = self.tick.wrapping_add(1);
            return None;
        }
        if let Action::Resize(_w, h) = action {
            // Rough estimate: total height minus header/footer/borders
            self.visible_rows = (h as usize).saturating_sub(6);
            return None;
        }

        if self.alert.is_some() {
            if matches!(action, Action::NavigateBack | Action::ViewResult) {
                self.alert = None;
            }
            return None;
        }

        if self.show_help {
            if matches!(action, Action::ToggleHelp | Action::NavigateBack) {
                self.show_help = false;
            }
            return None;
        }

        match action {
            Action::ToggleHelp => {
                self.show_help = true;
            }
            Action::NavigateBack => {
                if self.screen == Screen::Detail {
                    self.screen = Screen::Tasks;
                    self.notice = None;
                }
            }
            Action::Download => {
                if self.screen == Screen::Detail {
                    if let Some(result) = &self.detail {
                        self.notice = Some(format!("Saving {}...", result.file_name));
                        return Some(Command::Download(result.clone()));
                    }
                }
            }
            Action::ViewResult => {
                if self.screen == Screen::Tasks {
                    if let Some(row) = self.rows.get(self.cursor) {
                        if row.is_viewable() {
                            return Some(Command::View(row.task_id.clone()));
                        }
                    }
                }
            }
            Action::Refresh => {
                if !self.rows.is_empty() {
                    return Some(Command::Refresh);
                }
            }
            Action::Resubmit => {
                if self.phase != BatchPhase::Submitting {
                    self.reset_view();
                    self.phase = BatchPhase::Submitting;
                    return Some(Command::Submit);
                }
            }
            Action::MoveDown => match self.screen {
                Screen::Tasks => {
                    if self.cursor + 1 < self.rows.len() {
                        self.cursor += 1;
                    }
                }
                Screen::Detail => {
                    self.detail_scroll = self.detail_scroll.saturating_add(1);
                }
            },
            Action::MoveUp => match self.screen {
                Screen::Tasks => self.cursor = self.cursor.saturating_sub(1),
                Screen::Detail => self.detail_scroll = self.detail_scroll.saturating_sub(1),
            },
            Action::PageDown => {
                let page = self.visible_rows.max(1);
                match self.screen {
                    Screen::Tasks => {
                        self.cursor = (self.cursor + page).min(self.rows.len().saturating_sub(1));
                    }
                    Screen::Detail => {
                        self.detail_scroll = self.detail_scroll.saturating_add(page as u16);
                    }
                }
            }
            Action::PageUp => {
                let page = self.visible_rows.max(1);
                match self.screen {
                    Screen::Tasks => self.cursor = self.cursor.saturating_sub(page),
                    Screen::Detail => {
                        self.detail_scroll = self.detail_scroll.saturating_sub(page as u16);
                    }
                }
            }
            Action::GoTop => match self.screen {
                Screen::Tasks => self.cursor = 0,
                Screen::Detail => self.detail_scroll = 0,
            },
            Action::GoBottom => match self.screen {
                Screen::Tasks => self.cursor = self.rows.len().saturating_sub(1),
                // clamped by Paragraph rendering
                Screen::Detail => self.detail_scroll = u16::MAX,
            },
            Action::Quit | Action::Tick | Action::Resize(..) | Action::None => {}
        }
        None
    }

    /// Clear rows and hide the detail panel ahead of a new submission.
    fn reset_view(&mut self) {
        self.generation = None;
        self.rows.clear();
        self.cursor = 0;
        self.detail = None;
        self.notice = None;
        self.detail_scroll = 0;
        self.screen = Screen::Tasks;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == Some(generation)
    }

    /// Terminal statuses are final; late updates for a finished row are dropped.
    fn set_status(&mut self, index: usize, task_id: &TaskId, status: TaskStatus) {
        if let Some(row) = self.rows.get_mut(index) {
            if &row.task_id == task_id && !row.status.is_terminal() {
                row.status = status;
            }
        }
    }

    /// Process a backend event and update model state.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SubmitStarted { file_count } => {
                log::debug!("submitting {} file(s)", file_count);
                self.reset_view();
                self.phase = BatchPhase::Submitting;
            }
            BackendEvent::Submitted { generation, tasks } => {
                self.reset_view();
                self.generation = Some(generation);
                self.rows = tasks
                    .into_iter()
                    .map(|(id, status)| TaskRow::new(id, status))
                    .collect();
                self.phase = BatchPhase::Polling;
            }
            BackendEvent::SubmitFailed { error } => {
                self.reset_view();
                self.phase = BatchPhase::SubmitFailed(error);
            }
            BackendEvent::Poll(PollEvent::StatusChanged {
                generation,
                index,
                task_id,
                status,
            }) => {
                if self.is_current(generation) {
                    self.set_status(index, &task_id, status);
                }
            }
            BackendEvent::Poll(PollEvent::Finished { generation }) => {
                if self.is_current(generation) {
                    self.phase = BatchPhase::Complete;
                }
            }
            BackendEvent::Refreshed {
                generation,
                updates,
            } => {
                if self.is_current(generation) {
                    for StatusUpdate {
                        index,
                        task_id,
                        status,
                    } in updates
                    {
                        self.set_status(index, &task_id, status);
                    }
                }
            }
            BackendEvent::ResultReady { generation, result } => {
                if self.is_current(generation) {
                    self.detail = Some(result);
                    self.notice = None;
                    self.detail_scroll = 0;
                    self.screen = Screen::Detail;
                }
            }
            BackendEvent::ResultUnavailable {
                generation,
                task_id,
                message,
            } => {
                if self.is_current(generation) {
                    log::info!("result for {} unavailable: {}", task_id, message);
                    self.detail = None;
                    self.screen = Screen::Tasks;
                    self.alert = Some("Result not ready or already consumed!".to_string());
                }
            }
            BackendEvent::Downloaded { task_id, path } => {
                if self.showing(&task_id) {
                    self.notice = Some(format!("Saved to {}", path.display()));
                }
            }
            BackendEvent::DownloadFailed { task_id, message } => {
                if self.showing(&task_id) {
                    self.notice = Some(format!("Download failed: {message}"));
                }
            }
        }
    }

    fn showing(&self, task_id: &TaskId) -> bool {
        self.detail.as_ref().is_some_and(|r| &r.task_id == task_id)
    }

    /// Render the current screen.
    pub fn view(&self, f: &mut ratatui::Frame) {
        match (&self.screen, &self.detail) {
            (Screen::Detail, Some(result)) => crate::view::detail::render(f, self, result),
            _ => crate::view::tasks::render(f, self),
        }

        if self.show_help {
            crate::view::help::render(f, &self.theme);
        }
        if let Some(message) = &self.alert {
            crate::view::alert::render(f, &self.theme, message);
        }
    }
}

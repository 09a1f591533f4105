use std::path::PathBuf;

use owo_colors::OwoColorize;
use taskwatch_core::{Batch, TaskId, TaskResult, TaskStatus};

/// Terminal styling that can be switched off with `--no-color`.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn status(&self, status: &TaskStatus) -> String {
        let label = status.as_str();
        if !self.color {
            return label.to_string();
        }
        match status {
            TaskStatus::Success => label.green().bold().to_string(),
            TaskStatus::Failed => label.red().bold().to_string(),
            TaskStatus::Pending => label.yellow().to_string(),
            TaskStatus::Other(_) => label.cyan().to_string(),
        }
    }

    pub fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn warn(&self, text: &str) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }
}

/// What happened to one batch, ready for printing.
#[derive(Debug, Default)]
pub struct Report {
    pub results: Vec<TaskResult>,
    /// Annotated images written with `--download-dir`.
    pub saved: Vec<(TaskId, PathBuf)>,
    /// Successful tasks whose result or image could not be fetched.
    pub unavailable: Vec<(TaskId, String)>,
    pub cancelled: bool,
}

pub fn render(batch: &Batch, report: &Report, palette: Palette) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(palette.heading(&format!("Tasks ({})", batch.len())));
    let id_width = batch
        .tasks()
        .iter()
        .map(|t| t.id.as_str().chars().count())
        .max()
        .unwrap_or(0);
    for (i, task) in batch.tasks().iter().enumerate() {
        lines.push(format!(
            "  {:>3}  {:<width$}  {}",
            i + 1,
            task.id.as_str(),
            palette.status(&task.status),
            width = id_width
        ));
    }

    if !report.results.is_empty() {
        lines.push(String::new());
        lines.push(palette.heading("Results"));
        for result in &report.results {
            lines.push(format!("  {}  {}", result.task_id, result.file_name));
            lines.push(format!("       {}", palette.dim(&result.image_url)));
        }
    }

    if !report.saved.is_empty() {
        lines.push(String::new());
        lines.push(palette.heading("Saved"));
        for (task_id, path) in &report.saved {
            lines.push(format!("  {}  {}", task_id, path.display()));
        }
    }

    if !report.unavailable.is_empty() {
        lines.push(String::new());
        lines.push(palette.heading("Unavailable"));
        for (task_id, reason) in &report.unavailable {
            lines.push(format!("  {}  {}", task_id, palette.warn(reason)));
        }
    }

    let succeeded = count(batch, |s| *s == TaskStatus::Success);
    let failed = count(batch, |s| *s == TaskStatus::Failed);
    let unfinished = batch.len() - batch.terminal_count();

    lines.push(String::new());
    let mut summary = format!(
        "{} succeeded, {} failed, {} unfinished",
        succeeded, failed, unfinished
    );
    if report.cancelled {
        summary.push_str(" (cancelled)");
    }
    lines.push(format!("{} {}", palette.heading("Summary:"), summary));
    lines
}

fn count(batch: &Batch, pred: impl Fn(&TaskStatus) -> bool) -> usize {
    batch.tasks().iter().filter(|t| pred(&t.status)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwatch_core::Task;

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: TaskId::from(id),
            result_url: format!("http://localhost:8000/api/result/{id}"),
            status,
        }
    }

    fn batch() -> Batch {
        Batch::new(
            1,
            vec![
                task("aaa", TaskStatus::Success),
                task("bbbb", TaskStatus::Failed),
                task("cc", TaskStatus::Pending),
            ],
        )
        .unwrap()
    }

    #[test]
    fn plain_palette_has_no_escape_codes() {
        let palette = Palette::new(false);
        assert_eq!(palette.status(&TaskStatus::Success), "SUCCESS");
        assert_eq!(palette.heading("Tasks"), "Tasks");
        assert!(Palette::new(true).status(&TaskStatus::Failed).contains('\u{1b}'));
    }

    #[test]
    fn render_lists_tasks_in_order_and_counts() {
        let lines = render(&batch(), &Report::default(), Palette::new(false));
        assert_eq!(lines[0], "Tasks (3)");
        assert_eq!(lines[1], "    1  aaa   SUCCESS");
        assert_eq!(lines[2], "    2  bbbb  FAILED");
        assert_eq!(lines[3], "    3  cc    PENDING");
        assert_eq!(
            lines.last().unwrap(),
            "Summary: 1 succeeded, 1 failed, 1 unfinished"
        );
    }

    #[test]
    fn render_includes_results_and_unavailable() {
        let report = Report {
            results: vec![TaskResult {
                task_id: TaskId::from("aaa"),
                bbox: serde_json::json!([[1, 2, 3, 4]]),
                file_name: "cat.jpg".into(),
                image_url: "http://localhost:8000/cat.jpg".into(),
            }],
            saved: vec![(TaskId::from("aaa"), PathBuf::from("out/cat.jpg"))],
            unavailable: vec![(TaskId::from("bbbb"), "already consumed".into())],
            cancelled: true,
        };
        let lines = render(&batch(), &report, Palette::new(false));
        assert!(lines.contains(&"  aaa  cat.jpg".to_string()));
        assert!(lines.contains(&"       http://localhost:8000/cat.jpg".to_string()));
        assert!(lines.contains(&"  aaa  out/cat.jpg".to_string()));
        assert!(lines.contains(&"  bbbb  already consumed".to_string()));
        assert!(lines.last().unwrap().ends_with("(cancelled)"));
    }
}

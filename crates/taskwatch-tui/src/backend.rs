use std::path::PathBuf;

use taskwatch_core::{Batch, PollEvent, PollHandle, StatusUpdate, TaskPoller, UploadFile};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tui_event::{BackendEvent, Command};

/// Backend state: the current batch and the poll watching it.
///
/// `current` mirrors the poll's batch so manual refreshes and result views
/// can run while the poll owns its own copy.
struct Session {
    poller: TaskPoller,
    files: Vec<UploadFile>,
    download_dir: PathBuf,
    current: Option<Batch>,
    polling: Option<PollHandle>,
    tx: mpsc::UnboundedSender<BackendEvent>,
}

/// Serve TUI commands until the command channel closes or `cancel` fires.
///
/// A new submission cancels the previous poll before the new batch exists,
/// so at most one poll runs at a time. Requests in flight are abandoned as
/// soon as `cancel` fires.
pub async fn run(
    poller: TaskPoller,
    files: Vec<UploadFile>,
    download_dir: PathBuf,
    mut commands: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<BackendEvent>,
    cancel: CancellationToken,
) {
    let mut session = Session {
        poller,
        files,
        download_dir,
        current: None,
        polling: None,
        tx,
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = commands.recv() => match cmd {
                Some(cmd) => {
                    let completed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => false,
                        _ = session.handle_command(cmd) => true,
                    };
                    if !completed {
                        break;
                    }
                }
                None => break,
            },
            event = next_poll_event(&mut session.polling) => match event {
                Some(event) => session.handle_poll_event(event),
                None => session.polling = None,
            },
        }
    }

    session.stop_polling();
}

async fn next_poll_event(polling: &mut Option<PollHandle>) -> Option<PollEvent> {
    match polling {
        Some(handle) => handle.next_event().await,
        None => std::future::pending().await,
    }
}

impl Session {
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit => self.submit().await,
            Command::Refresh => self.refresh().await,
            Command::View(task_id) => {
                let Some(batch) = self.current.as_ref() else {
                    return;
                };
                let generation = batch.generation();
                let event = match self.poller.view_result(batch, &task_id).await {
                    Ok(result) => BackendEvent::ResultReady { generation, result },
                    Err(e) => BackendEvent::ResultUnavailable {
                        generation,
                        task_id,
                        message: e.to_string(),
                    },
                };
                let _ = self.tx.send(event);
            }
            Command::Download(result) => {
                let task_id = result.task_id.clone();
                let saved = self
                    .poller
                    .download_result(&result, &self.download_dir)
                    .await;
                let event = match saved {
                    Ok(path) => BackendEvent::Downloaded { task_id, path },
                    Err(e) => {
                        log::warn!("download for {} failed: {}", task_id, e);
                        BackendEvent::DownloadFailed {
                            task_id,
                            message: e.to_string(),
                        }
                    }
                };
                let _ = self.tx.send(event);
            }
        }
    }

    async fn submit(&mut self) {
        self.stop_polling();
        self.current = None;
        let _ = self.tx.send(BackendEvent::SubmitStarted {
            file_count: self.files.len(),
        });

        match self.poller.submit(self.files.clone()).await {
            Ok(batch) => {
                let tasks = batch
                    .tasks()
                    .iter()
                    .map(|t| (t.id.clone(), t.status.clone()))
                    .collect();
                let _ = self.tx.send(BackendEvent::Submitted {
                    generation: batch.generation(),
                    tasks,
                });
                self.polling = Some(self.poller.poll_all(batch.clone()));
                self.current = Some(batch);
            }
            Err(e) => {
                let _ = self.tx.send(BackendEvent::SubmitFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn refresh(&mut self) {
        let Some(batch) = self.current.as_mut() else {
            return;
        };
        let summary = self.poller.refresh_once(batch).await;
        log::debug!(
            "manual refresh: {} change(s), {}/{} terminal",
            summary.updates.len(),
            summary.terminal,
            summary.total
        );
        if !summary.updates.is_empty() {
            let _ = self.tx.send(BackendEvent::Refreshed {
                generation: batch.generation(),
                updates: summary.updates,
            });
        }
    }

    fn handle_poll_event(&mut self, event: PollEvent) {
        if let (
            Some(batch),
            PollEvent::StatusChanged {
                generation,
                index,
                task_id,
                status,
            },
        ) = (self.current.as_mut(), &event)
        {
            if batch.generation() == *generation {
                batch.apply(&StatusUpdate {
                    index: *index,
                    task_id: task_id.clone(),
                    status: status.clone(),
                });
            }
        }
        let _ = self.tx.send(BackendEvent::Poll(event));
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.polling.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use taskwatch_core::api::ResultEnvelope;
    use taskwatch_core::{Config, CoreError, SubmittedTask, TaskApi, TaskId, TaskStatus};
    use tokio::task::JoinHandle;

    use super::*;

    /// Fake server. Submission `n` creates tasks `n-a` and `n-b`. Tasks of the
    /// first submission flip between two running states forever, later ones
    /// succeed at once. Each result can be read once.
    #[derive(Default)]
    struct FakeApi {
        submissions: Mutex<u32>,
        submit_delay: Duration,
        status_calls: Mutex<HashMap<String, usize>>,
        results_read: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn status_calls_with_prefix(&self, prefix: &str) -> usize {
            self.status_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id.starts_with(prefix))
                .map(|(_, n)| n)
                .sum()
        }
    }

    #[async_trait]
    impl TaskApi for FakeApi {
        async fn submit(&self, _files: &[UploadFile]) -> Result<Vec<SubmittedTask>, CoreError> {
            if !self.submit_delay.is_zero() {
                tokio::time::sleep(self.submit_delay).await;
            }
            let n = {
                let mut count = self.submissions.lock().unwrap();
                *count += 1;
                *count
            };
            Ok(["a", "b"]
                .iter()
                .map(|suffix| {
                    let id = format!("{n}-{suffix}");
                    SubmittedTask {
                        url_result: format!("/api/result/{id}"),
                        task_id: id.into(),
                        status: TaskStatus::Pending,
                    }
                })
                .collect())
        }

        async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, CoreError> {
            let calls = {
                let mut map = self.status_calls.lock().unwrap();
                let entry = map.entry(task_id.to_string()).or_default();
                *entry += 1;
                *entry
            };
            if task_id.as_str().starts_with("1-") {
                let label = if calls % 2 == 0 { "PROCESSING" } else { "STARTED" };
                Ok(TaskStatus::from(label))
            } else {
                Ok(TaskStatus::Success)
            }
        }

        async fn result(&self, result_url: &str) -> Result<ResultEnvelope, CoreError> {
            let mut read = self.results_read.lock().unwrap();
            if read.iter().any(|u| u == result_url) {
                return Ok(ResultEnvelope {
                    status: "PENDING".into(),
                    result: serde_json::json!(""),
                });
            }
            read.push(result_url.to_string());
            let id = result_url.rsplit('/').next().unwrap_or_default();
            Ok(ResultEnvelope {
                status: "SUCCESS".into(),
                result: serde_json::json!({
                    "bbox": [[1, 2, 3, 4]],
                    "file_name": format!("{id}.jpg"),
                }),
            })
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, CoreError> {
            Ok(url.as_bytes().to_vec())
        }
    }

    struct Harness {
        commands: mpsc::UnboundedSender<Command>,
        events: mpsc::UnboundedReceiver<BackendEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    fn start(api: Arc<FakeApi>, download_dir: PathBuf) -> Harness {
        let config = Config {
            base_url: "http://api".into(),
            poll_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let poller = TaskPoller::new(api, config);
        let files = vec![UploadFile::new("a.jpg", vec![1]), UploadFile::new("b.jpg", vec![2])];
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(poller, files, download_dir, cmd_rx, tx, cancel.clone()));
        Harness {
            commands: cmd_tx,
            events,
            cancel,
            task,
        }
    }

    impl Harness {
        /// Receive events until `pred` matches, returning everything seen.
        async fn until(&mut self, pred: impl Fn(&BackendEvent) -> bool) -> Vec<BackendEvent> {
            let mut seen = Vec::new();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("backend event in time")
                    .expect("backend still running");
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }
    }

    fn submitted(event: &BackendEvent) -> Option<u64> {
        match event {
            BackendEvent::Submitted { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resubmission_stops_the_old_poll() {
        let api = Arc::new(FakeApi::default());
        let mut h = start(api.clone(), PathBuf::from("."));

        h.commands.send(Command::Submit).unwrap();
        let first = h.until(|e| submitted(e).is_some()).await;
        let old_generation = submitted(first.last().unwrap()).unwrap();

        // Wait until the first poll has produced a few status changes.
        for _ in 0..3 {
            h.until(|e| matches!(e, BackendEvent::Poll(PollEvent::StatusChanged { .. })))
                .await;
        }

        h.commands.send(Command::Submit).unwrap();
        let second = h.until(|e| submitted(e).is_some()).await;
        let new_generation = submitted(second.last().unwrap()).unwrap();
        assert_ne!(old_generation, new_generation);
        let old_calls = api.status_calls_with_prefix("1-");

        let rest = h
            .until(|e| matches!(e, BackendEvent::Poll(PollEvent::Finished { .. })))
            .await;
        for event in &rest {
            if let BackendEvent::Poll(poll) = event {
                assert_eq!(poll.generation(), new_generation);
            }
        }

        // The old poll never queries the server again.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(api.status_calls_with_prefix("1-"), old_calls);
        assert!(h.events.try_recv().is_err());

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn view_maps_to_ready_then_unavailable() {
        let api = Arc::new(FakeApi::default());
        let mut h = start(api, PathBuf::from("."));

        h.commands.send(Command::Submit).unwrap();
        let events = h.until(|e| submitted(e).is_some()).await;
        let generation = submitted(events.last().unwrap()).unwrap();

        h.commands.send(Command::View("1-a".into())).unwrap();
        let events = h
            .until(|e| matches!(e, BackendEvent::ResultReady { .. }))
            .await;
        match events.last().unwrap() {
            BackendEvent::ResultReady { generation: g, result } => {
                assert_eq!(*g, generation);
                assert_eq!(result.file_name, "1-a.jpg");
                assert_eq!(result.image_url, "http://api/1-a.jpg");
            }
            other => panic!("unexpected event {other:?}"),
        }

        h.commands.send(Command::View("1-a".into())).unwrap();
        let events = h
            .until(|e| matches!(e, BackendEvent::ResultUnavailable { .. }))
            .await;
        assert!(matches!(
            events.last().unwrap(),
            BackendEvent::ResultUnavailable { task_id, .. } if task_id.as_str() == "1-a"
        ));

        h.commands.send(Command::View("nope".into())).unwrap();
        let events = h
            .until(|e| matches!(e, BackendEvent::ResultUnavailable { .. }))
            .await;
        assert!(matches!(
            events.last().unwrap(),
            BackendEvent::ResultUnavailable { message, .. } if message.contains("unknown task")
        ));

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn download_writes_into_the_download_dir() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::default());
        let mut h = start(api, dir.path().to_path_buf());

        let result = taskwatch_core::TaskResult {
            task_id: "1-a".into(),
            bbox: serde_json::json!([]),
            file_name: "static/1-a.jpg".into(),
            image_url: "http://api/static/1-a.jpg".into(),
        };
        h.commands.send(Command::Download(result)).unwrap();
        let events = h
            .until(|e| matches!(e, BackendEvent::Downloaded { .. }))
            .await;
        let BackendEvent::Downloaded { path, .. } = events.last().unwrap() else {
            unreachable!()
        };
        assert_eq!(path, &dir.path().join("1-a.jpg"));
        assert_eq!(std::fs::read(path).unwrap(), b"http://api/static/1-a.jpg");

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_abandons_a_slow_submission() {
        let api = Arc::new(FakeApi {
            submit_delay: Duration::from_secs(10),
            ..FakeApi::default()
        });
        let mut h = start(api, PathBuf::from("."));

        h.commands.send(Command::Submit).unwrap();
        h.until(|e| matches!(e, BackendEvent::SubmitStarted { .. }))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        h.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .expect("backend stops promptly after cancel")
            .unwrap();
    }
}

//! Batch submission and status polling.
//!
//! The poller holds no batch state. Callers own their [`Batch`]: it is
//! returned by [`TaskPoller::submit`], moved into [`TaskPoller::poll_all`]
//! and handed back by [`PollHandle::join`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::api::{DetectionPayload, HttpTaskApi, TaskApi, UploadFile};
use crate::result::TaskResult;
use crate::task::{Batch, StatusUpdate, TaskId, TaskStatus, resolve_url};
use crate::{Config, CoreError};

/// Events emitted by a running poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A task's status differs from the last one seen.
    StatusChanged {
        generation: u64,
        index: usize,
        task_id: TaskId,
        status: TaskStatus,
    },
    /// Every task in the batch is terminal; polling has stopped.
    Finished { generation: u64 },
}

impl PollEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::StatusChanged { generation, .. } | Self::Finished { generation } => *generation,
        }
    }
}

/// Outcome of one poll round applied to a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Tasks whose status changed in this round.
    pub updates: Vec<StatusUpdate>,
    pub terminal: usize,
    pub total: usize,
}

impl RoundSummary {
    pub fn is_complete(&self) -> bool {
        self.terminal == self.total
    }
}

/// Handle to a running [`TaskPoller::poll_all`].
///
/// Dropping the handle cancels the poll.
pub struct PollHandle {
    generation: u64,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<PollEvent>,
    task: JoinHandle<Batch>,
    guard: DropGuard,
}

impl PollHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A clone of the token that stops this poll.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next status event. `None` once polling has stopped and every event
    /// has been received.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.events.recv().await
    }

    /// Wait for the poll to stop and take back the batch.
    pub async fn join(self) -> Result<Batch, CoreError> {
        let PollHandle { task, guard, .. } = self;
        let batch = task.await?;
        guard.disarm();
        Ok(batch)
    }
}

/// Submits batches and tracks their tasks until they finish.
pub struct TaskPoller {
    api: Arc<dyn TaskApi>,
    config: Config,
    next_generation: AtomicU64,
}

impl TaskPoller {
    pub fn new(api: Arc<dyn TaskApi>, config: Config) -> Self {
        Self {
            api,
            config,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Poller over HTTP using `config` for the endpoint and timeouts.
    pub fn from_config(config: Config) -> Result<Self, CoreError> {
        let api = HttpTaskApi::new(&config)?;
        Ok(Self::new(Arc::new(api), config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Upload `files` and build a new batch from the response.
    ///
    /// Every call yields a batch with a fresh generation.
    pub async fn submit(&self, files: Vec<UploadFile>) -> Result<Batch, CoreError> {
        if files.is_empty() {
            return Err(CoreError::NoFiles);
        }
        let count = files.len();
        let submitted = match self.api.submit(&files).await {
            Ok(s) => s,
            Err(e) => {
                log::error!("submission of {} file(s) failed: {}", count, e);
                return Err(e);
            }
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let batch = Batch::from_submission(generation, &self.config.base_url, submitted)?;
        if batch.len() != count {
            log::warn!(
                "submitted {} file(s) but server created {} task(s)",
                count,
                batch.len()
            );
        }
        log::info!(
            "batch {}: {} task(s) submitted to {}",
            generation,
            batch.len(),
            self.config.base_url
        );
        Ok(batch)
    }

    /// Query every non-terminal task once and return what the server reported.
    ///
    /// Requests run concurrently and are joined; each is bounded by the request
    /// timeout. Tasks whose fetch fails are left out.
    pub async fn poll_round(&self, batch: &Batch) -> Vec<StatusUpdate> {
        run_round(self.api.as_ref(), self.config.request_timeout, batch).await
    }

    /// One manual poll round on a caller-owned batch.
    pub async fn refresh_once(&self, batch: &mut Batch) -> RoundSummary {
        let observed = self.poll_round(batch).await;
        let updates = observed.into_iter().filter(|u| batch.apply(u)).collect();
        RoundSummary {
            updates,
            terminal: batch.terminal_count(),
            total: batch.len(),
        }
    }

    /// Poll `batch` on the configured interval until every task is terminal
    /// or the returned handle is cancelled.
    ///
    /// The first round runs immediately.
    pub fn poll_all(&self, batch: Batch) -> PollHandle {
        let generation = batch.generation();
        let cancel = CancellationToken::new();
        let (tx, events) = mpsc::unbounded_channel();

        let task = tokio::spawn(poll_loop(
            self.api.clone(),
            self.config.poll_interval,
            self.config.request_timeout,
            batch,
            tx,
            cancel.clone(),
        ));

        PollHandle {
            generation,
            guard: cancel.clone().drop_guard(),
            cancel,
            events,
            task,
        }
    }

    /// Fetch the result of a task.
    ///
    /// Succeeds only if the server reports exactly `SUCCESS`. The server may
    /// hand a result out once, so a second call can fail with
    /// [`CoreError::ResultNotReady`].
    pub async fn view_result(
        &self,
        batch: &Batch,
        task_id: &TaskId,
    ) -> Result<TaskResult, CoreError> {
        let task = batch
            .get(task_id)
            .ok_or_else(|| CoreError::UnknownTask(task_id.clone()))?;

        let envelope = self.api.result(&task.result_url).await?;
        if envelope.status != "SUCCESS" {
            log::info!("result for {} not ready (status {})", task_id, envelope.status);
            return Err(CoreError::ResultNotReady {
                task_id: task_id.clone(),
                status: envelope.status,
            });
        }

        let payload: DetectionPayload = serde_json::from_value(envelope.result)?;
        Ok(TaskResult {
            task_id: task_id.clone(),
            image_url: resolve_url(&self.config.base_url, &payload.file_name),
            bbox: payload.bbox,
            file_name: payload.file_name,
        })
    }

    /// Save the annotated image of `result` into `dir`.
    ///
    /// The file keeps the last component of the server's file name. Returns
    /// the written path.
    pub async fn download_result(
        &self,
        result: &TaskResult,
        dir: &Path,
    ) -> Result<PathBuf, CoreError> {
        let name = Path::new(&result.file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| result.task_id.as_str().into());
        let dest = dir.join(name);

        let bytes = self.api.download(&result.image_url).await?;
        tokio::fs::write(&dest, &bytes).await?;
        log::info!(
            "saved {} ({} bytes) for {}",
            dest.display(),
            bytes.len(),
            result.task_id
        );
        Ok(dest)
    }
}

async fn run_round(api: &dyn TaskApi, timeout: Duration, batch: &Batch) -> Vec<StatusUpdate> {
    let fetches = batch.pending().map(|(index, task)| async move {
        match tokio::time::timeout(timeout, api.status(&task.id)).await {
            Ok(Ok(status)) => Some(StatusUpdate {
                index,
                task_id: task.id.clone(),
                status,
            }),
            Ok(Err(e)) => {
                log::trace!("status of {} unavailable: {}", task.id, e);
                None
            }
            Err(_) => {
                log::trace!("status of {} timed out", task.id);
                None
            }
        }
    });
    join_all(fetches).await.into_iter().flatten().collect()
}

async fn poll_loop(
    api: Arc<dyn TaskApi>,
    interval: Duration,
    timeout: Duration,
    mut batch: Batch,
    tx: mpsc::UnboundedSender<PollEvent>,
    cancel: CancellationToken,
) -> Batch {
    let generation = batch.generation();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rounds: u64 = 0;

    loop {
        if batch.is_complete() {
            log::info!(
                "batch {}: all {} task(s) terminal after {} round(s)",
                generation,
                batch.len(),
                rounds
            );
            let _ = tx.send(PollEvent::Finished { generation });
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let observed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            observed = run_round(api.as_ref(), timeout, &batch) => observed,
        };
        rounds += 1;

        for update in observed {
            if batch.apply(&update) {
                let _ = tx.send(PollEvent::StatusChanged {
                    generation,
                    index: update.index,
                    task_id: update.task_id,
                    status: update.status,
                });
            }
        }

        log::debug!(
            "batch {} round {}: {}/{} terminal",
            generation,
            rounds,
            batch.terminal_count(),
            batch.len()
        );
    }

    if cancel.is_cancelled() {
        log::info!("batch {}: polling cancelled", generation);
    }
    batch
}

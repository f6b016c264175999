//! Task lifecycle controller: submits, restarts and polls one reconstruction
//! task at a time.
//!
//! The poll loop runs on the tokio runtime and only sends messages. Every
//! message carries the controller generation that spawned it; `pump` drops
//! messages from older generations, so after `cancel` (or a newer `start`)
//! nothing from the previous loop can reach the task state.

use std::sync::Arc;
use std::time::Duration;

use shared::{CreateTaskRequest, TaskId, TaskStatusResponse};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::client::TaskBackend;
use crate::error::PollError;
use crate::state::{ReconstructionTask, TaskEvent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Consecutive transport failures before the task is failed
    pub retry_budget: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            retry_budget: 5,
        }
    }
}

#[derive(Debug)]
enum PollMessage {
    Status(Result<TaskStatusResponse, PollError>),
    Submitted(Result<TaskId, PollError>),
    RestartFailed(PollError),
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    message: PollMessage,
}

pub struct TaskController<B: TaskBackend> {
    backend: Arc<B>,
    config: PollConfig,
    runtime: Handle,
    generation: u64,
    task: Option<ReconstructionTask>,
    cancel_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl<B: TaskBackend> TaskController<B> {
    pub fn new(backend: B, config: PollConfig, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend: Arc::new(backend),
            config,
            runtime,
            generation: 0,
            task: None,
            cancel_tx: None,
            handle: None,
            tx,
            rx,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub fn task(&self) -> Option<&ReconstructionTask> {
        self.task.as_ref()
    }

    /// A poll, submit or restart job is running
    pub fn is_polling(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Track `task_id` from scratch, replacing any task being polled
    pub fn start(&mut self, task_id: impl Into<TaskId>) {
        let task = ReconstructionTask::new(task_id);
        info!(task = %task.id, "Polling reconstruction task");
        let id = task.id.clone();
        self.task = Some(task);
        self.spawn(move |backend, generation, cancel, tx, config| async move {
            poll_loop(backend, id, generation, config, cancel, tx).await;
        });
    }

    /// Create a task on the backend, then poll it
    pub fn submit(&mut self, request: CreateTaskRequest) {
        self.task = None;
        info!(method = ?request.method, files = request.file_ids.len(), "Submitting reconstruction");
        self.spawn(move |backend, generation, cancel, tx, _| async move {
            let result = backend.submit(&request).await;
            if *cancel.borrow() {
                return;
            }
            let _ = tx.send(Envelope {
                generation,
                message: PollMessage::Submitted(result),
            });
        });
    }

    /// Ask the backend to rerun the current task and resume polling it.
    /// The local state resets immediately (same id).
    pub fn restart(&mut self) -> bool {
        let Some(task) = self.task.as_mut() else {
            return false;
        };
        task.reset();
        let id = task.id.clone();
        info!(task = %id, "Restarting reconstruction task");
        self.spawn(move |backend, generation, cancel, tx, config| async move {
            if let Err(e) = backend.restart(&id).await {
                if !*cancel.borrow() {
                    let _ = tx.send(Envelope {
                        generation,
                        message: PollMessage::RestartFailed(e),
                    });
                }
                return;
            }
            poll_loop(backend, id, generation, config, cancel, tx).await;
        });
        true
    }

    /// Stop polling. Nothing sent by the stopped job is applied afterwards.
    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(cancel) = self.cancel_tx.take() {
            let _ = cancel.send(true);
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Task polling stopped");
        }
    }

    /// Forget the task entirely
    pub fn clear(&mut self) {
        self.cancel();
        self.task = None;
    }

    fn spawn<F, Fut>(&mut self, job: F)
    where
        F: FnOnce(Arc<B>, u64, watch::Receiver<bool>, mpsc::UnboundedSender<Envelope>, PollConfig) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let fut = job(
            Arc::clone(&self.backend),
            self.generation,
            cancel_rx,
            self.tx.clone(),
            self.config,
        );
        self.cancel_tx = Some(cancel_tx);
        self.handle = Some(self.runtime.spawn(fut));
    }

    /// Drain pending messages and reduce them into the task state.
    /// Call once per frame on the host thread.
    pub fn pump(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            events.extend(self.reduce(envelope));
        }
        events
    }

    /// Wait until at least one current-generation message arrives, then
    /// drain like [`pump`](Self::pump).
    pub async fn wait_events(&mut self) -> Vec<TaskEvent> {
        loop {
            let Some(envelope) = self.rx.recv().await else {
                return Vec::new();
            };
            let mut events = self.reduce(envelope);
            events.extend(self.pump());
            if !events.is_empty() {
                return events;
            }
        }
    }

    fn reduce(&mut self, envelope: Envelope) -> Vec<TaskEvent> {
        if envelope.generation != self.generation {
            warn!(
                generation = envelope.generation,
                current = self.generation,
                "Discarding stale task message"
            );
            return Vec::new();
        }

        let events = match envelope.message {
            PollMessage::Submitted(Ok(task_id)) => {
                self.start(task_id.clone());
                vec![TaskEvent::Submitted(task_id)]
            }
            PollMessage::Submitted(Err(e)) => {
                warn!("Task submission failed: {e}");
                self.handle = None;
                vec![TaskEvent::SubmitFailed(e.to_string())]
            }
            PollMessage::RestartFailed(e) => match self.task.as_mut() {
                Some(task) => task.fail(format!("Restart failed: {e}")),
                None => Vec::new(),
            },
            PollMessage::Status(result) => {
                let budget = self.config.retry_budget;
                match (self.task.as_mut(), result) {
                    (Some(task), Ok(response)) => task.apply_response(&response),
                    (Some(task), Err(e)) if e.is_transient() => task.apply_transport_error(&e, budget),
                    (Some(task), Err(e)) => task.fail(e.to_string()),
                    (None, _) => Vec::new(),
                }
            }
        };

        if self.task.as_ref().is_some_and(|t| t.is_terminal()) {
            // The loop stops itself on terminal outcomes; make it definitive
            self.cancel();
        }
        events
    }
}

impl<B: TaskBackend> Drop for TaskController<B> {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_loop<B: TaskBackend>(
    backend: Arc<B>,
    task_id: TaskId,
    generation: u64,
    config: PollConfig,
    mut cancel: watch::Receiver<bool>,
    tx: mpsc::UnboundedSender<Envelope>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.changed() => return,
        }
        if *cancel.borrow() {
            return;
        }

        let result = backend.fetch_status(&task_id).await;
        if *cancel.borrow() {
            return;
        }

        let stop = match &result {
            Ok(response) => {
                failures = 0;
                debug!(task = %task_id, status = %response.status, progress = response.progress, "Poll");
                response.status.is_terminal()
            }
            Err(e) if e.is_transient() => {
                failures += 1;
                failures >= config.retry_budget
            }
            Err(_) => true,
        };

        let envelope = Envelope {
            generation,
            message: PollMessage::Status(result),
        };
        if tx.send(envelope).is_err() || stop {
            return;
        }
    }
}

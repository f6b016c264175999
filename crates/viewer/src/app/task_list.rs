//! Backend task listing for the task panel

use shared::{TaskId, TaskSummary};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::PollError;
use crate::task::HttpTaskClient;

enum ListMessage {
    Listed(Result<Vec<TaskSummary>, PollError>),
    Deleted(TaskId, Result<(), PollError>),
}

/// Most recent task list fetched from the backend
pub struct TaskList {
    client: HttpTaskClient,
    tasks: Vec<TaskSummary>,
    error: Option<String>,
    in_flight: usize,
    tx: mpsc::UnboundedSender<ListMessage>,
    rx: mpsc::UnboundedReceiver<ListMessage>,
}

impl TaskList {
    pub fn new(client: HttpTaskClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            tasks: Vec::new(),
            error: None,
            in_flight: 0,
            tx,
            rx,
        }
    }

    pub fn tasks(&self) -> &[TaskSummary] {
        &self.tasks
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn refresh(&mut self, runtime: &Handle) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;
        runtime.spawn(async move {
            let _ = tx.send(ListMessage::Listed(client.list_tasks().await));
        });
    }

    pub fn delete(&mut self, runtime: &Handle, id: TaskId) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        self.in_flight += 1;
        runtime.spawn(async move {
            let result = client.delete_task(&id).await;
            let _ = tx.send(ListMessage::Deleted(id, result));
        });
    }

    /// Apply finished requests. Call once per frame.
    pub fn drain(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            match message {
                ListMessage::Listed(Ok(mut tasks)) => {
                    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                    self.tasks = tasks;
                    self.error = None;
                }
                ListMessage::Listed(Err(e)) => {
                    tracing::warn!("Failed to list tasks: {e}");
                    self.error = Some(e.to_string());
                }
                ListMessage::Deleted(id, Ok(())) => {
                    tracing::info!(task = %id, "Task deleted");
                    self.tasks.retain(|t| t.id != id);
                }
                ListMessage::Deleted(id, Err(e)) => {
                    tracing::warn!(task = %id, "Failed to delete task: {e}");
                    self.error = Some(e.to_string());
                }
            }
        }
    }
}

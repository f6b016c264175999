//! Reconstruction task state and its reduction from backend responses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{ResultDescriptor, TaskId, TaskStatus, TaskStatusResponse};
use tracing::{error, info, warn};

use crate::error::PollError;

/// Observable change produced by reducing a poll outcome
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task was created by the backend and is now being polled
    Submitted(TaskId),
    StatusChanged { from: TaskStatus, to: TaskStatus },
    Progress { progress: f64, message: String },
    ResultReady(ResultDescriptor),
    Failed(String),
    /// Transient poll failure, retried on the next tick
    Retrying { attempt: u32, budget: u32, error: String },
    SubmitFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructionTask {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Percent in [0, 100]
    pub progress: f64,
    pub message: String,
    /// Present only once completed
    pub result: Option<ResultDescriptor>,
    pub created_at: DateTime<Utc>,
    /// Consecutive transport failures since the last good response
    pub transport_failures: u32,
}

impl ReconstructionTask {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            message: String::new(),
            result: None,
            created_at: Utc::now(),
            transport_failures: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Back to `pending` for a restart; the id is kept
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0.0;
        self.message.clear();
        self.result = None;
        self.transport_failures = 0;
    }

    fn transition(&mut self, to: TaskStatus, events: &mut Vec<TaskEvent>) {
        if self.status != to {
            info!(task = %self.id, from = %self.status, %to, "Task status changed");
            events.push(TaskEvent::StatusChanged {
                from: self.status,
                to,
            });
            self.status = to;
        }
    }

    /// Reduce one successful status response. Terminal states absorb
    /// everything that follows.
    pub fn apply_response(&mut self, response: &TaskStatusResponse) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        if self.is_terminal() {
            return events;
        }
        self.transport_failures = 0;

        let progress = if response.progress.is_finite() {
            response.progress.clamp(0.0, 100.0)
        } else {
            self.progress
        };
        let message = response.message.clone().unwrap_or_else(|| self.message.clone());

        match response.status {
            TaskStatus::Completed => match &response.result {
                Some(result) => {
                    self.transition(TaskStatus::Completed, &mut events);
                    self.update_progress(100.0, message, &mut events);
                    self.result = Some(result.clone());
                    info!(task = %self.id, model = %result.model_url, "Reconstruction result ready");
                    events.push(TaskEvent::ResultReady(result.clone()));
                }
                None => {
                    events.extend(self.fail("Task completed without a result"));
                }
            },
            TaskStatus::Failed => {
                let reason = response
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Reconstruction failed".to_string());
                events.extend(self.fail(reason));
            }
            status => {
                self.transition(status, &mut events);
                self.update_progress(progress, message, &mut events);
            }
        }
        events
    }

    fn update_progress(&mut self, progress: f64, message: String, events: &mut Vec<TaskEvent>) {
        if progress != self.progress || message != self.message {
            self.progress = progress;
            self.message = message;
            events.push(TaskEvent::Progress {
                progress,
                message: self.message.clone(),
            });
        }
    }

    /// Count a transient failure; exhausting `budget` fails the task
    pub fn apply_transport_error(&mut self, err: &PollError, budget: u32) -> Vec<TaskEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.transport_failures += 1;
        let attempt = self.transport_failures;
        if attempt >= budget {
            return self.fail(format!("Network error after {attempt} attempts: {err}"));
        }
        warn!(task = %self.id, attempt, budget, "Status poll failed: {err}");
        self.message = format!("Connection problem ({attempt}/{budget}), retrying");
        vec![TaskEvent::Retrying {
            attempt,
            budget,
            error: err.to_string(),
        }]
    }

    /// Mark failed with `reason`; no-op once terminal
    pub fn fail(&mut self, reason: impl Into<String>) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        if self.is_terminal() {
            return events;
        }
        let reason = reason.into();
        error!(task = %self.id, "Task failed: {reason}");
        self.transition(TaskStatus::Failed, &mut events);
        self.message = reason.clone();
        events.push(TaskEvent::Failed(reason));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: TaskStatus, progress: f64) -> TaskStatusResponse {
        TaskStatusResponse::new(status, progress, format!("at {progress}"))
    }

    #[test]
    fn test_processing_then_completed() {
        let mut t = ReconstructionTask::new("t1");
        let ev = t.apply_response(&resp(TaskStatus::Processing, 10.0));
        assert_eq!(
            ev[0],
            TaskEvent::StatusChanged {
                from: TaskStatus::Pending,
                to: TaskStatus::Processing
            }
        );
        let ev = t.apply_response(&resp(TaskStatus::Processing, 60.0));
        assert_eq!(ev.len(), 1);
        assert!(matches!(ev[0], TaskEvent::Progress { progress, .. } if progress == 60.0));

        let result = ResultDescriptor::new("/models/r.ply");
        let ev = t.apply_response(&resp(TaskStatus::Completed, 100.0).with_result(result.clone()));
        assert!(ev.contains(&TaskEvent::ResultReady(result.clone())));
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.result, Some(result));
    }

    #[test]
    fn test_terminal_is_absorbing() {
        let mut t = ReconstructionTask::new("t1");
        t.apply_response(&resp(TaskStatus::Failed, 30.0));
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.apply_response(&resp(TaskStatus::Processing, 50.0)).is_empty());
        assert!(t.fail("again").is_empty());
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn test_completed_without_result_fails() {
        let mut t = ReconstructionTask::new("t1");
        let ev = t.apply_response(&resp(TaskStatus::Completed, 100.0));
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(matches!(ev.last(), Some(TaskEvent::Failed(_))));
        assert!(t.result.is_none());
    }

    #[test]
    fn test_progress_clamped() {
        let mut t = ReconstructionTask::new("t1");
        t.apply_response(&resp(TaskStatus::Processing, 140.0));
        assert_eq!(t.progress, 100.0);
        t.apply_response(&resp(TaskStatus::Processing, -5.0));
        assert_eq!(t.progress, 0.0);
    }

    #[test]
    fn test_backend_failure_message_kept() {
        let mut t = ReconstructionTask::new("t1");
        let mut r = resp(TaskStatus::Failed, 40.0);
        r.message = Some("out of GPU memory".into());
        let ev = t.apply_response(&r);
        assert!(ev.contains(&TaskEvent::Failed("out of GPU memory".into())));
        assert_eq!(t.message, "out of GPU memory");
    }

    #[test]
    fn test_retry_budget() {
        let mut t = ReconstructionTask::new("t1");
        let err = PollError::Transport("refused".into());
        for i in 1..5 {
            let ev = t.apply_transport_error(&err, 5);
            assert!(matches!(ev[0], TaskEvent::Retrying { attempt, .. } if attempt == i));
        }
        // A good response resets the counter
        t.apply_response(&resp(TaskStatus::Processing, 5.0));
        assert_eq!(t.transport_failures, 0);
        for _ in 0..4 {
            t.apply_transport_error(&err, 5);
        }
        let ev = t.apply_transport_error(&err, 5);
        assert!(matches!(ev.last(), Some(TaskEvent::Failed(_))));
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn test_reset_keeps_id() {
        let mut t = ReconstructionTask::new("t1");
        t.apply_response(&resp(TaskStatus::Failed, 30.0));
        t.reset();
        assert_eq!(t.id, "t1");
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.progress, 0.0);
        assert!(t.message.is_empty());
    }
}

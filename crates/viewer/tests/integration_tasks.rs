//! Integration tests for the reconstruction task lifecycle: polling,
//! terminal states, restart, submission and loading the produced model.

use recon_viewer_lib::engine::ViewerStatus;
use recon_viewer_lib::error::PollError;
use recon_viewer_lib::fixtures::{self, completed, failed, processing, ScriptedBackend};
use recon_viewer_lib::harness::{test_settings, TestHarness};
use recon_viewer_lib::state::TaskEvent;
use shared::{CreateTaskRequest, TaskStatus};

const MODEL_URL: &str = "http://recon.test/models/cube.ply";

fn harness(backend: ScriptedBackend) -> TestHarness {
    let h = TestHarness::with(backend, test_settings()).unwrap();
    h.source().insert(MODEL_URL, fixtures::PLY_ASCII_CUBE);
    h
}

fn transitions(events: &[TaskEvent]) -> Vec<(TaskStatus, TaskStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::StatusChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_processing_then_completed_loads_result() {
    let backend = ScriptedBackend::new([processing(10.0), processing(60.0), completed("/models/cube.ply")]);
    let mut h = harness(backend.clone());

    let events = h.run_task("task-42");

    assert_eq!(
        transitions(&events),
        vec![
            (TaskStatus::Pending, TaskStatus::Processing),
            (TaskStatus::Processing, TaskStatus::Completed),
        ]
    );
    let progress: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![10.0, 60.0, 100.0]);
    let ready = events.iter().filter(|e| matches!(e, TaskEvent::ResultReady(_))).count();
    assert_eq!(ready, 1);

    // Relative model URL resolved against the backend and loaded
    let asset = h.engine().asset().expect("result loaded");
    assert_eq!(asset.source_url, MODEL_URL);
    assert_eq!(h.engine().status(), &ViewerStatus::Ready);

    // Polling stopped at the terminal state
    assert!(!h.engine().is_polling());
    let calls = backend.status_calls();
    std::thread::sleep(std::time::Duration::from_millis(60));
    assert_eq!(backend.status_calls(), calls);
    assert_eq!(backend.polled_ids(), vec!["task-42".to_string()]);
}

#[test]
fn test_backend_failure_is_terminal() {
    let mut h = harness(ScriptedBackend::new([processing(20.0), failed("out of memory")]));
    let events = h.run_task("t");
    assert!(events.contains(&TaskEvent::Failed("out of memory".to_string())));
    let task = h.engine().task().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        h.engine().status(),
        &ViewerStatus::TaskFailed("out of memory".to_string())
    );
    assert!(h.engine().asset().is_none());
}

#[test]
fn test_completed_without_result_fails() {
    let response = shared::TaskStatusResponse::new(TaskStatus::Completed, 100.0, "done");
    let mut h = harness(ScriptedBackend::new([response]));
    h.run_task("t");
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Failed);
    assert!(h.engine().status().is_error());
}

#[test]
fn test_transport_errors_within_budget_are_retried() {
    let backend = ScriptedBackend::default();
    backend.push(Err(PollError::Transport("connection reset".into())));
    backend.push(Err(PollError::Transport("connection reset".into())));
    backend.push(Ok(completed("/models/cube.ply")));
    let mut h = harness(backend);

    let events = h.run_task("t");
    let retries = events.iter().filter(|e| matches!(e, TaskEvent::Retrying { .. })).count();
    assert_eq!(retries, 2);
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Completed);
}

#[test]
fn test_transport_budget_exhausted_fails() {
    let backend = ScriptedBackend::default();
    backend.push(Err(PollError::Transport("unreachable".into())));
    let mut settings = test_settings();
    settings.server.retry_budget = 3;
    let mut h = TestHarness::with(backend.clone(), settings).unwrap();

    h.run_task("t");
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Failed);
    assert_eq!(backend.status_calls(), 3);
}

#[test]
fn test_restart_resets_and_polls_again() {
    let backend = ScriptedBackend::new([failed("boom")]);
    let mut h = harness(backend.clone());
    h.run_task("t");
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Failed);

    backend.push(Ok(processing(50.0)));
    backend.push(Ok(completed("/models/cube.ply")));
    assert!(h.engine_mut().restart_task());
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Pending);

    h.drain_task();
    assert_eq!(backend.restart_calls(), 1);
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Completed);
    assert!(h.engine().asset().is_some());
}

#[test]
fn test_restart_without_task_is_rejected() {
    let mut h = harness(ScriptedBackend::default());
    assert!(!h.engine_mut().restart_task());
}

#[test]
fn test_submit_then_poll() {
    let backend = ScriptedBackend::new([completed("/models/cube.ply")]);
    backend.set_submit_result(Ok("created-7".to_string()));
    let mut h = harness(backend.clone());

    h.engine_mut().submit_task(CreateTaskRequest {
        file_ids: vec!["upload-1".to_string()],
        ..Default::default()
    });
    assert!(h.engine().task().is_none());
    // The task appears once the backend answered
    let mut events = h.next_events();
    events.extend(h.drain_task());
    assert!(events.contains(&TaskEvent::Submitted("created-7".to_string())));
    assert_eq!(h.engine().task().unwrap().id, "created-7");
    assert_eq!(backend.polled_ids(), vec!["created-7".to_string()]);
}

#[test]
fn test_cancel_stops_polling() {
    let backend = ScriptedBackend::new([processing(10.0)]);
    let mut h = harness(backend.clone());
    h.engine_mut().start_task("t");
    h.engine_mut().cancel_task();
    assert!(!h.engine().is_polling());

    let calls = backend.status_calls();
    std::thread::sleep(std::time::Duration::from_millis(60));
    h.engine_mut().update();
    assert_eq!(backend.status_calls(), calls);
    assert_eq!(h.engine().task().unwrap().status, TaskStatus::Pending);
}

use std::sync::Once;

use lexplan_core::{
    update, AppState, Effect, ExecutionMode, FailedOp, JobKind, Msg, QueueStatus, QueueStatusData,
    TrackMode, WorkflowStage,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn submit(state: AppState, query: &str) -> (AppState, Vec<Effect>) {
    let (state, _) = update(state, Msg::QueryChanged(query.to_string()));
    update(state, Msg::SubmitQuery)
}

fn plan_payload(plan_id: &str, total_cases: u64) -> serde_json::Value {
    json!({
        "plan_id": plan_id,
        "total_cases": total_cases,
        "total_chunks": 3,
        "estimated_time_seconds": 120,
    })
}

/// Drives a fresh state to `Preview` with plan `plan_id` via job `handle`.
fn previewed_plan(plan_id: &str, handle: &str) -> AppState {
    let (state, _) = submit(AppState::new(), "review contract liability");
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::CreatePlan,
            handle: handle.to_string(),
        },
    );
    let (state, _) = update(
        state,
        Msg::JobTerminal {
            handle: handle.to_string(),
            outcome: Ok(plan_payload(plan_id, 42)),
        },
    );
    assert_eq!(state.stage(), WorkflowStage::Preview);
    state
}

#[test]
fn blank_query_is_rejected_without_effects() {
    init_logging();
    let (state, effects) = submit(AppState::new(), "   ");

    assert_eq!(state.stage(), WorkflowStage::Input);
    assert!(state.error_message().is_some());
    assert!(effects.is_empty());
}

#[test]
fn submit_starts_plan_creation() {
    init_logging();
    let (mut state, effects) = submit(AppState::new(), "  review contract liability  ");

    assert_eq!(state.stage(), WorkflowStage::CreatingPlan);
    assert!(state.consume_dirty());
    assert_eq!(
        effects,
        vec![Effect::CreatePlan {
            query: "review contract liability".to_string(),
        }]
    );
}

#[test]
fn submit_is_ignored_outside_input_stage() {
    init_logging();
    let (state, _) = submit(AppState::new(), "first query");
    assert_eq!(state.stage(), WorkflowStage::CreatingPlan);

    let (state, effects) = update(state, Msg::SubmitQuery);
    assert_eq!(state.stage(), WorkflowStage::CreatingPlan);
    assert!(effects.is_empty());
}

#[test]
fn accepted_job_is_tracked_in_single_mode() {
    init_logging();
    let (state, _) = submit(AppState::new(), "review contract liability");
    let (state, effects) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::CreatePlan,
            handle: "J1".to_string(),
        },
    );

    assert_eq!(
        state.active_job().map(|job| job.handle.as_str()),
        Some("J1")
    );
    assert_eq!(
        effects,
        vec![Effect::Track {
            handle: "J1".to_string(),
            mode: TrackMode::Single,
        }]
    );
}

#[test]
fn completed_plan_moves_to_preview() {
    init_logging();
    let state = previewed_plan("P1", "J1");

    let plan = state.plan().unwrap();
    assert_eq!(plan.plan_id, "P1");
    assert_eq!(plan.total_cases, 42);
    assert!(state.active_job().is_none());
}

#[test]
fn status_updates_apply_only_to_the_tracked_job() {
    init_logging();
    let (state, _) = submit(AppState::new(), "review contract liability");
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::CreatePlan,
            handle: "J1".to_string(),
        },
    );

    let status = QueueStatusData {
        position: 2,
        total: 5,
        status: QueueStatus::Processing,
    };
    let (state, _) = update(
        state,
        Msg::JobStatus {
            handle: "stale-handle".to_string(),
            status,
        },
    );
    assert_eq!(state.queue_status(), None);

    let (state, _) = update(
        state,
        Msg::JobStatus {
            handle: "J1".to_string(),
            status,
        },
    );
    assert_eq!(state.queue_status(), Some(status));
}

#[test]
fn late_events_after_terminal_are_ignored() {
    init_logging();
    let state = previewed_plan("P1", "J1");

    // A straggler status frame from the push channel.
    let (state, effects) = update(
        state,
        Msg::JobStatus {
            handle: "J1".to_string(),
            status: QueueStatusData {
                position: 1,
                total: 1,
                status: QueueStatus::Processing,
            },
        },
    );
    assert_eq!(state.queue_status(), None);
    assert!(effects.is_empty());

    // A duplicate terminal from the pull channel.
    let (state, effects) = update(
        state,
        Msg::JobTerminal {
            handle: "J1".to_string(),
            outcome: Err("duplicate".to_string()),
        },
    );
    assert_eq!(state.stage(), WorkflowStage::Preview);
    assert!(state.error_message().is_none());
    assert!(effects.is_empty());
}

#[test]
fn direct_mode_chains_plan_into_execution() {
    init_logging();
    let (state, _) = update(AppState::new(), Msg::SetExecutionMode(ExecutionMode::Direct));
    let (state, _) = submit(state, "review contract liability");
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::CreatePlan,
            handle: "J1".to_string(),
        },
    );
    let (state, effects) = update(
        state,
        Msg::JobTerminal {
            handle: "J1".to_string(),
            outcome: Ok(plan_payload("P1", 7)),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Executing);
    assert_eq!(
        effects,
        vec![Effect::ExecutePlan {
            plan_id: "P1".to_string(),
            prefs: None,
        }]
    );
}

#[test]
fn plan_creation_failure_falls_back_to_input() {
    init_logging();
    let (state, _) = submit(AppState::new(), "review contract liability");
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::CreatePlan,
            handle: "J1".to_string(),
        },
    );
    let (state, effects) = update(
        state,
        Msg::JobTerminal {
            handle: "J1".to_string(),
            outcome: Err("model overloaded".to_string()),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Input);
    assert_eq!(state.error_message().as_deref(), Some("model overloaded"));
    assert!(effects.is_empty());
}

#[test]
fn unparseable_plan_payload_falls_back_to_input() {
    init_logging();
    let (state, _) = submit(AppState::new(), "review contract liability");
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::CreatePlan,
            handle: "J1".to_string(),
        },
    );
    let (state, _) = update(
        state,
        Msg::JobTerminal {
            handle: "J1".to_string(),
            outcome: Ok(json!({"unexpected": true})),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Input);
    assert!(state.error_message().is_some());
    assert!(state.plan().is_none());
}

#[test]
fn execute_without_plan_sets_error() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::ExecutePlan);

    assert_eq!(state.stage(), WorkflowStage::Input);
    assert!(state.error_message().is_some());
    assert!(effects.is_empty());
}

#[test]
fn execution_success_keeps_plan_and_attaches_result() {
    init_logging();
    let state = previewed_plan("P1", "J1");
    let (state, _) = update(state, Msg::ExecutePlan);
    assert_eq!(state.stage(), WorkflowStage::Executing);

    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::ExecutePlan,
            handle: "J2".to_string(),
        },
    );
    let (state, effects) = update(
        state,
        Msg::JobTerminal {
            handle: "J2".to_string(),
            outcome: Ok(json!({"cases_analyzed": 42})),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Executing);
    assert_eq!(state.result(), Some(&json!({"cases_analyzed": 42})));
    assert_eq!(state.query(), "");
    assert!(effects.is_empty());
}

#[test]
fn execution_failure_returns_to_preview_with_plan_intact() {
    init_logging();
    let state = previewed_plan("P1", "J1");
    let (state, _) = update(state, Msg::ExecutePlan);
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::ExecutePlan,
            handle: "J2".to_string(),
        },
    );
    let (state, _) = update(
        state,
        Msg::JobTerminal {
            handle: "J2".to_string(),
            outcome: Err("worker crashed".to_string()),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Preview);
    assert_eq!(state.plan().map(|plan| plan.plan_id.as_str()), Some("P1"));
    assert_eq!(state.error_message().as_deref(), Some("worker crashed"));
}

#[test]
fn notification_prefs_are_sent_only_when_complete() {
    init_logging();
    let state = previewed_plan("P1", "J1");

    // Email without accepted terms is dropped.
    let (state, _) = update(
        state,
        Msg::SetNotificationPrefs {
            email: Some("lawyer@example.com".to_string()),
            terms_accepted: false,
        },
    );
    let (state, effects) = update(state, Msg::ExecutePlan);
    assert_eq!(
        effects,
        vec![Effect::ExecutePlan {
            plan_id: "P1".to_string(),
            prefs: None,
        }]
    );

    let (state, _) = update(
        state,
        Msg::SetNotificationPrefs {
            email: Some("lawyer@example.com".to_string()),
            terms_accepted: true,
        },
    );
    let (_state, effects) = update(state, Msg::ExecutePlan);
    match effects.as_slice() {
        [Effect::ExecutePlan { prefs: Some(prefs), .. }] => {
            assert_eq!(prefs.email, "lawyer@example.com");
            assert!(prefs.terms_accepted);
        }
        other => panic!("unexpected effects: {other:?}"),
    }
}

#[test]
fn transport_failure_during_creation_returns_to_input() {
    init_logging();
    let (state, _) = submit(AppState::new(), "review contract liability");
    let (state, effects) = update(
        state,
        Msg::RequestFailed {
            op: FailedOp::CreatePlan,
            message: "connection refused".to_string(),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Input);
    let message = state.error_message().unwrap();
    assert!(message.contains("plan creation"), "got: {message}");
    assert!(message.contains("connection refused"), "got: {message}");
    assert!(effects.is_empty());
}

#[test]
fn transport_failure_during_execution_returns_to_preview() {
    init_logging();
    let state = previewed_plan("P1", "J1");
    let (state, _) = update(state, Msg::ExecutePlan);
    let (state, _) = update(
        state,
        Msg::RequestFailed {
            op: FailedOp::ExecutePlan,
            message: "connection reset".to_string(),
        },
    );

    assert_eq!(state.stage(), WorkflowStage::Preview);
    assert_eq!(state.plan().map(|plan| plan.plan_id.as_str()), Some("P1"));
}

#[test]
fn close_session_resets_everything_and_clears_the_snapshot() {
    init_logging();
    let state = previewed_plan("P1", "J1");
    let (state, _) = update(state, Msg::ExecutePlan);
    let (state, _) = update(
        state,
        Msg::JobAccepted {
            kind: JobKind::ExecutePlan,
            handle: "J2".to_string(),
        },
    );

    let (state, effects) = update(state, Msg::CloseSession);

    assert_eq!(state.stage(), WorkflowStage::Input);
    assert!(state.plan().is_none());
    assert!(state.active_job().is_none());
    assert_eq!(
        effects,
        vec![
            Effect::StopTracking,
            Effect::ClearServerSession {
                handle: "J2".to_string(),
            },
            Effect::ClearSnapshot,
        ]
    );
}

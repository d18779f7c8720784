use crate::state::{ActiveJob, AppState, DraftTask, ExecutionMode, JobKind, WorkflowStage};
use crate::{Effect, FailedOp, Msg, SessionSnapshot, WorkflowError};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::QueryChanged(text) => {
            state.query = text;
            state.mark_dirty();
            Vec::new()
        }
        Msg::SubmitQuery => submit_query(&mut state),
        Msg::AddToQueue => add_to_queue(&mut state),
        Msg::DecomposeQuery => decompose_query(&mut state),
        Msg::ExecutePlan => execute_plan(&mut state),
        Msg::GeneratePlans => generate_plans(&mut state),
        Msg::ExecuteQueue {
            notification_email,
            terms_accepted,
        } => execute_queue(&mut state, notification_email, terms_accepted),
        Msg::RemoveTask { task_id } => {
            vec![Effect::RemoveTask { task_id }]
        }
        Msg::SetExecutionMode(mode) => {
            state.execution_mode = mode;
            state.mark_dirty();
            Vec::new()
        }
        Msg::SetNotificationPrefs {
            email,
            terms_accepted,
        } => {
            state.notification_email = email;
            state.terms_accepted = terms_accepted;
            state.mark_dirty();
            Vec::new()
        }
        Msg::CloseQueue => close_queue(&mut state),
        Msg::CloseSession => close_session(&mut state),
        Msg::RestoreSession(snapshot) => restore_session(&mut state, snapshot),
        Msg::JobAccepted { kind, handle } => {
            state.job = Some(ActiveJob {
                handle: handle.clone(),
                kind,
                resumed: false,
            });
            state.queue_status = None;
            state.mark_dirty();
            vec![Effect::Track {
                handle,
                mode: kind.track_mode(),
            }]
        }
        Msg::JobStatus { handle, status } => {
            // Stale updates for an untracked handle are dropped: a terminal
            // outcome always wins over late non-terminal events.
            if state.job.as_ref().is_some_and(|job| job.handle == handle) {
                state.queue_status = Some(status);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::JobTerminal { handle, outcome } => job_terminal(&mut state, handle, outcome),
        Msg::QueueRefreshed(tasks) => queue_refreshed(&mut state, tasks),
        Msg::DecompositionReady(tasks) => decomposition_ready(&mut state, tasks),
        Msg::RequestFailed { op, message } => request_failed(&mut state, op, message),
        Msg::SettleElapsed { generation } => settle_elapsed(&mut state, generation),
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn submit_query(state: &mut AppState) -> Vec<Effect> {
    if state.stage != WorkflowStage::Input {
        return Vec::new();
    }
    let query = state.query.trim().to_string();
    if query.is_empty() {
        state.set_error(WorkflowError::EmptyQuery);
        return Vec::new();
    }
    state.clear_error();
    state.plan = None;
    state.result = None;
    state.is_queue_mode = false;
    state.set_stage(WorkflowStage::CreatingPlan);
    vec![Effect::CreatePlan { query }]
}

fn add_to_queue(state: &mut AppState) -> Vec<Effect> {
    if state.stage != WorkflowStage::Input && state.stage != WorkflowStage::QueueManagement {
        return Vec::new();
    }
    let query = state.query.trim().to_string();
    if query.is_empty() {
        state.set_error(WorkflowError::EmptyQuery);
        return Vec::new();
    }
    state.clear_error();
    // The query is kept until the server confirms the add (via the follow-up
    // refresh), so a failed add leaves it in place for a retry.
    state.pending_add = true;
    state.set_stage(WorkflowStage::QueueManagement);
    vec![Effect::AddTask {
        query,
        metadata: None,
    }]
}

fn decompose_query(state: &mut AppState) -> Vec<Effect> {
    if state.stage != WorkflowStage::Input {
        return Vec::new();
    }
    let query = state.query.trim().to_string();
    if query.is_empty() {
        state.set_error(WorkflowError::EmptyQuery);
        return Vec::new();
    }
    state.clear_error();
    vec![Effect::Decompose { query }]
}

fn execute_plan(state: &mut AppState) -> Vec<Effect> {
    let Some(plan_id) = state.plan.as_ref().map(|plan| plan.plan_id.clone()) else {
        state.set_error(WorkflowError::MissingPlan);
        return Vec::new();
    };
    state.clear_error();
    state.set_stage(WorkflowStage::Executing);
    vec![Effect::ExecutePlan {
        plan_id,
        prefs: state.notification_prefs(),
    }]
}

fn generate_plans(state: &mut AppState) -> Vec<Effect> {
    if state.stage != WorkflowStage::QueueManagement {
        return Vec::new();
    }
    state.clear_error();
    state.is_queue_mode = true;
    state.set_stage(WorkflowStage::CreatingPlan);
    vec![Effect::GeneratePlans]
}

fn execute_queue(
    state: &mut AppState,
    notification_email: Option<String>,
    terms_accepted: bool,
) -> Vec<Effect> {
    if state.stage != WorkflowStage::QueueManagement
        && state.stage != WorkflowStage::PreviewBatch
    {
        return Vec::new();
    }
    state.clear_error();
    state.is_queue_mode = true;
    state.notification_email = notification_email.clone();
    state.terms_accepted = terms_accepted;
    state.queue_status = None;
    state.settle_pending = false;
    state.set_stage(WorkflowStage::ExecutingQueue);
    vec![Effect::ExecuteQueue {
        notification_email,
        terms_accepted,
    }]
}

fn close_queue(state: &mut AppState) -> Vec<Effect> {
    state.clear_error();
    state.is_queue_mode = false;
    state.queue_status = None;
    state.settle_pending = false;
    state.pending_add = false;
    state.set_stage(WorkflowStage::Input);
    vec![Effect::ClearCompleted, Effect::ClearSnapshot]
}

fn close_session(state: &mut AppState) -> Vec<Effect> {
    let mut effects = vec![Effect::StopTracking];
    if let Some(job) = &state.job {
        effects.push(Effect::ClearServerSession {
            handle: job.handle.clone(),
        });
    }
    effects.push(Effect::ClearSnapshot);
    *state = AppState::new();
    effects
}

fn restore_session(state: &mut AppState, snapshot: SessionSnapshot) -> Vec<Effect> {
    // The store already guards the schema version; this is the last line of
    // defense against a raw snapshot injected by the host.
    if !snapshot.is_current_version() {
        return Vec::new();
    }
    state.query = snapshot.query;
    state.stage = snapshot.current_step;
    state.plan = snapshot.plan_data;
    state.result = snapshot.result;
    state.is_queue_mode = snapshot.is_queue_mode;
    state.notification_email = snapshot.notification_email;
    state.terms_accepted = snapshot.terms_accepted;
    state.mark_dirty();

    let mut effects = Vec::new();
    if state.is_queue_mode {
        effects.push(Effect::RefreshQueue);
    }
    if let Some(handle) = snapshot.job_id {
        if state.stage.is_job_bearing() {
            let kind = match (state.stage, state.is_queue_mode) {
                (WorkflowStage::CreatingPlan, true) => JobKind::GeneratePlans,
                (WorkflowStage::CreatingPlan, false) => JobKind::CreatePlan,
                (WorkflowStage::Executing, _) => JobKind::ExecutePlan,
                _ => JobKind::ExecuteQueue,
            };
            state.job = Some(ActiveJob {
                handle: handle.clone(),
                kind,
                resumed: true,
            });
            effects.push(Effect::Resume {
                handle,
                mode: kind.track_mode(),
            });
        }
    }
    effects
}

fn job_terminal(
    state: &mut AppState,
    handle: String,
    outcome: Result<serde_json::Value, String>,
) -> Vec<Effect> {
    let Some(job) = state.job.take_if(|job| job.handle == handle) else {
        // Already terminal (or never tracked): late events are ignored so a
        // completed stage never regresses.
        return Vec::new();
    };
    state.queue_status = None;
    state.mark_dirty();

    match job.kind {
        JobKind::CreatePlan => plan_created(state, outcome),
        JobKind::ExecutePlan => match outcome {
            Ok(value) => {
                state.result = Some(value);
                state.query.clear();
                // The workflow rests in `Executing` with the result attached;
                // moving to a results view is a UI concern.
                Vec::new()
            }
            Err(message) => {
                state.set_error(WorkflowError::Job(message));
                let fallback = if job.resumed {
                    WorkflowStage::Input
                } else {
                    // The plan itself is still valid and retryable.
                    WorkflowStage::Preview
                };
                state.set_stage(fallback);
                Vec::new()
            }
        },
        JobKind::GeneratePlans => match outcome {
            Ok(_) => {
                state.set_stage(WorkflowStage::PreviewBatch);
                vec![Effect::RefreshQueue]
            }
            Err(message) => {
                state.set_error(WorkflowError::Job(message));
                state.set_stage(WorkflowStage::QueueManagement);
                vec![Effect::RefreshQueue]
            }
        },
        JobKind::ExecuteQueue => {
            if let Err(message) = outcome {
                // A failed queue job does not invalidate the session: other
                // tasks may still be in flight, so the stage stays put.
                state.set_error(WorkflowError::Job(message));
            }
            // The settle path is driven by queue refreshes from here on.
            vec![Effect::RefreshQueue]
        }
    }
}

fn plan_created(state: &mut AppState, outcome: Result<serde_json::Value, String>) -> Vec<Effect> {
    match outcome {
        Ok(value) => match serde_json::from_value(value) {
            Ok(plan) => {
                state.plan = Some(plan);
                if state.execution_mode == ExecutionMode::Direct {
                    // Guard condition, not a buried callback: direct mode
                    // chains straight into execution.
                    return execute_plan(state);
                }
                state.set_stage(WorkflowStage::Preview);
                Vec::new()
            }
            Err(err) => {
                state.set_error(WorkflowError::Job(format!("invalid plan payload: {err}")));
                state.set_stage(WorkflowStage::Input);
                Vec::new()
            }
        },
        Err(message) => {
            state.set_error(WorkflowError::Job(message));
            state.set_stage(WorkflowStage::Input);
            Vec::new()
        }
    }
}

fn queue_refreshed(state: &mut AppState, tasks: Vec<crate::QueueTask>) -> Vec<Effect> {
    state.queue = tasks;
    if std::mem::take(&mut state.pending_add) && state.stage == WorkflowStage::QueueManagement {
        state.query.clear();
    }
    state.mark_dirty();

    if state.stage != WorkflowStage::ExecutingQueue {
        return Vec::new();
    }
    let all_terminal = state.all_queue_tasks_terminal();
    if all_terminal && !state.settle_pending {
        state.settle_pending = true;
        state.settle_generation += 1;
        return vec![Effect::ScheduleSettle {
            generation: state.settle_generation,
        }];
    }
    if !all_terminal && state.settle_pending {
        // A late refresh revealed a task still in flight: invalidate the
        // pending timer.
        state.settle_pending = false;
        state.settle_generation += 1;
    }
    Vec::new()
}

fn settle_elapsed(state: &mut AppState, generation: u64) -> Vec<Effect> {
    if state.stage != WorkflowStage::ExecutingQueue
        || !state.settle_pending
        || generation != state.settle_generation
    {
        return Vec::new();
    }
    state.settle_pending = false;
    state.job = None;
    state.queue_status = None;
    state.set_stage(WorkflowStage::QueueResults);
    vec![Effect::StopTracking]
}

fn decomposition_ready(state: &mut AppState, tasks: Vec<DraftTask>) -> Vec<Effect> {
    if tasks.is_empty() {
        state.set_error(WorkflowError::EmptyDecomposition);
        return Vec::new();
    }
    state.clear_error();
    state.query.clear();
    state.set_stage(WorkflowStage::QueueManagement);
    vec![Effect::PopulateQueue { tasks }]
}

fn request_failed(state: &mut AppState, op: FailedOp, message: String) -> Vec<Effect> {
    state.set_error(WorkflowError::Transport { op, message });
    match op {
        // The job-creating call never produced a handle, so the stage that
        // was waiting on it falls back to a retryable one.
        FailedOp::CreatePlan if state.stage == WorkflowStage::CreatingPlan => {
            state.job = None;
            state.set_stage(WorkflowStage::Input);
        }
        FailedOp::ExecutePlan if state.stage == WorkflowStage::Executing => {
            state.job = None;
            state.set_stage(WorkflowStage::Preview);
        }
        FailedOp::GeneratePlans if state.stage == WorkflowStage::CreatingPlan => {
            state.job = None;
            state.set_stage(WorkflowStage::QueueManagement);
        }
        FailedOp::ExecuteQueue if state.stage == WorkflowStage::ExecutingQueue => {
            state.job = None;
            state.set_stage(WorkflowStage::QueueManagement);
        }
        // Queue edits leave the stage alone; a failed add never landed, so
        // the typed query stays available for a retry.
        FailedOp::QueueEdit => {
            state.pending_add = false;
        }
        // Decomposition and status pulls leave the stage alone too.
        _ => {}
    }
    Vec::new()
}

use serde::{Deserialize, Serialize};

use crate::snapshot::{SessionSnapshot, SCHEMA_VERSION};
use crate::view_model::{AppViewModel, QueueRowView};
use crate::WorkflowError;

/// The single active workflow stage. Transitions in `update` are the only
/// legal way to change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    #[default]
    Input,
    QueueManagement,
    CreatingPlan,
    Preview,
    PreviewBatch,
    Executing,
    ExecutingQueue,
    QueueResults,
}

impl WorkflowStage {
    /// Stages that carry a server-side job worth re-attaching to on restore.
    pub fn is_job_bearing(self) -> bool {
        matches!(
            self,
            WorkflowStage::CreatingPlan | WorkflowStage::Executing | WorkflowStage::ExecutingQueue
        )
    }
}

/// Server-computed execution plan for a single query. Immutable once set;
/// replaced wholesale when a new plan arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanData {
    pub plan_id: String,
    #[serde(default)]
    pub total_cases: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub estimated_time_seconds: u64,
    #[serde(default)]
    pub preview_data: Vec<serde_json::Value>,
    #[serde(default)]
    pub strategy_summary: Option<String>,
    #[serde(default)]
    pub original_total_cases: Option<u64>,
    #[serde(default)]
    pub strategies_used: Option<Vec<String>>,
    #[serde(default)]
    pub strategy_breakdown: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// A queued, not-yet-executed query. The Queue Service is the source of
/// truth; this is a refreshable cached copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: String,
    pub query: String,
    pub state: TaskState,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

/// Transient position/progress report for the tracked job; overwritten on
/// every status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatusData {
    pub position: u32,
    pub total: u32,
    pub status: QueueStatus,
}

/// A sub-task suggestion produced by query decomposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftTask {
    pub query: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub rationale: Option<String>,
}

/// Optional descriptive fields attached to a queue task on add.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskMetadata {
    pub title: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub rationale: Option<String>,
}

/// Notification preferences sent with plan execution. Only built when the
/// email is present and terms are accepted; partial preferences are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPrefs {
    pub email: String,
    pub terms_accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Plan creation pauses at `Preview` for user review.
    #[default]
    Review,
    /// Plan creation chains straight into execution.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    CreatePlan,
    ExecutePlan,
    GeneratePlans,
    ExecuteQueue,
}

impl JobKind {
    pub fn track_mode(self) -> crate::TrackMode {
        match self {
            JobKind::ExecuteQueue => crate::TrackMode::Queue,
            _ => crate::TrackMode::Single,
        }
    }
}

/// The one job being tracked this session. At most one exists at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub handle: String,
    pub kind: JobKind,
    /// Set when the job was re-attached from a persisted snapshot; failures
    /// on a resumed job always fall back to `Input`.
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub(crate) stage: WorkflowStage,
    pub(crate) query: String,
    pub(crate) plan: Option<PlanData>,
    pub(crate) job: Option<ActiveJob>,
    pub(crate) queue: Vec<QueueTask>,
    pub(crate) queue_status: Option<QueueStatusData>,
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) error: Option<WorkflowError>,
    pub(crate) execution_mode: ExecutionMode,
    pub(crate) is_queue_mode: bool,
    /// A queue add is in flight; the query is cleared once the server
    /// confirms it through the follow-up refresh.
    pub(crate) pending_add: bool,
    pub(crate) notification_email: Option<String>,
    pub(crate) terms_accepted: bool,
    pub(crate) settle_generation: u64,
    pub(crate) settle_pending: bool,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn plan(&self) -> Option<&PlanData> {
        self.plan.as_ref()
    }

    pub fn active_job(&self) -> Option<&ActiveJob> {
        self.job.as_ref()
    }

    pub fn queue(&self) -> &[QueueTask] {
        &self.queue
    }

    pub fn queue_status(&self) -> Option<QueueStatusData> {
        self.queue_status
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn is_queue_mode(&self) -> bool {
        self.is_queue_mode
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    /// Returns whether the state changed since the last call, clearing the
    /// flag. The host renders and persists once per consumed change.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            stage: self.stage,
            query: self.query.clone(),
            plan_id: self.plan.as_ref().map(|plan| plan.plan_id.clone()),
            estimated_time_seconds: self.plan.as_ref().map(|plan| plan.estimated_time_seconds),
            queue: self
                .queue
                .iter()
                .map(|task| QueueRowView {
                    id: task.id.clone(),
                    query: task.query.clone(),
                    state: task.state,
                    title: task.title.clone(),
                })
                .collect(),
            queue_status: self.queue_status,
            has_result: self.result.is_some(),
            error: self.error_message(),
            tracking_job: self.job.as_ref().map(|job| job.handle.clone()),
            dirty: self.dirty,
        }
    }

    /// Builds the full persisted record. The timestamp is injected by the
    /// host so the core stays clock-free.
    pub fn snapshot(&self, timestamp: String) -> SessionSnapshot {
        SessionSnapshot {
            version: SCHEMA_VERSION.to_string(),
            query: self.query.clone(),
            current_step: self.stage,
            plan_data: self.plan.clone(),
            job_id: self.job.as_ref().map(|job| job.handle.clone()),
            result: self.result.clone(),
            is_queue_mode: self.is_queue_mode,
            notification_email: self.notification_email.clone(),
            terms_accepted: self.terms_accepted,
            timestamp,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_stage(&mut self, stage: WorkflowStage) {
        self.stage = stage;
        self.mark_dirty();
    }

    pub(crate) fn set_error(&mut self, error: WorkflowError) {
        self.error = Some(error);
        self.mark_dirty();
    }

    pub(crate) fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.mark_dirty();
        }
    }

    pub(crate) fn notification_prefs(&self) -> Option<NotificationPrefs> {
        match (&self.notification_email, self.terms_accepted) {
            (Some(email), true) if !email.trim().is_empty() => Some(NotificationPrefs {
                email: email.clone(),
                terms_accepted: true,
            }),
            _ => None,
        }
    }

    pub(crate) fn all_queue_tasks_terminal(&self) -> bool {
        !self.queue.is_empty() && self.queue.iter().all(|task| task.state.is_terminal())
    }
}

use crate::state::{QueueStatusData, TaskState, WorkflowStage};

/// Render-ready projection of [`crate::AppState`]. The UI reads only this,
/// so it always reflects exactly one unambiguous stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub stage: WorkflowStage,
    pub query: String,
    pub plan_id: Option<String>,
    pub estimated_time_seconds: Option<u64>,
    pub queue: Vec<QueueRowView>,
    pub queue_status: Option<QueueStatusData>,
    pub has_result: bool,
    pub error: Option<String>,
    pub tracking_job: Option<String>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRowView {
    pub id: String,
    pub query: String,
    pub state: TaskState,
    pub title: Option<String>,
}

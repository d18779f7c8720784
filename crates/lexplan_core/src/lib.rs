//! Lexplan core: pure workflow state machine and view-model helpers.
mod effect;
mod error;
mod msg;
mod snapshot;
mod state;
mod update;
mod view_model;

pub use effect::{Effect, TrackMode};
pub use error::WorkflowError;
pub use msg::{FailedOp, Msg};
pub use snapshot::{SessionSnapshot, SCHEMA_VERSION};
pub use state::{
    ActiveJob, AppState, DraftTask, ExecutionMode, JobKind, NotificationPrefs, PlanData,
    QueueStatus, QueueStatusData, QueueTask, TaskMetadata, TaskState, WorkflowStage,
};
pub use update::update;
pub use view_model::{AppViewModel, QueueRowView};

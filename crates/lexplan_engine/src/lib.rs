//! Lexplan engine: service clients, status tracking and effect execution.
mod config;
mod engine;
mod jobs;
mod queue;
mod status;
mod types;

pub use config::EngineConfig;
pub use engine::{EngineCommand, EngineHandle};
pub use jobs::{HttpJobService, JobService};
pub use queue::{HttpQueueService, QueueService};
pub use status::{
    ChannelEventSink, EventSink, HttpStatusChannel, StatusChannel, StatusStream, StatusTracker,
};
pub use types::{
    CreatedJob, DraftTask, EngineEvent, FailedOp, JobKind, JobState, JobStatusResponse,
    NotificationPrefs, ServiceError, StatusFrame, TaskMetadata, TaskRecord, TrackMode,
};

use crate::state::{DraftTask, NotificationPrefs, TaskMetadata};

/// How the status tracker follows a job: queue-mode jobs get the 2s pull
/// fallback in addition to the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Single,
    Queue,
}

/// Side effects requested by `update`. The host executes them through the
/// engine; the core never performs IO itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreatePlan {
        query: String,
    },
    ExecutePlan {
        plan_id: String,
        prefs: Option<NotificationPrefs>,
    },
    Decompose {
        query: String,
    },
    AddTask {
        query: String,
        metadata: Option<TaskMetadata>,
    },
    /// Add several decomposed sub-tasks, then refresh once.
    PopulateQueue {
        tasks: Vec<DraftTask>,
    },
    RemoveTask {
        task_id: String,
    },
    RefreshQueue,
    GeneratePlans,
    ExecuteQueue {
        notification_email: Option<String>,
        terms_accepted: bool,
    },
    ClearCompleted,
    /// Attach the status multiplexer to a job, detaching any previous one.
    Track {
        handle: String,
        mode: TrackMode,
    },
    /// Re-attach after restore: one authoritative pull, then track if the
    /// job is still pending.
    Resume {
        handle: String,
        mode: TrackMode,
    },
    StopTracking,
    /// Start the settle timer before locking in `QueueResults`.
    ScheduleSettle {
        generation: u64,
    },
    /// Best-effort server-side cleanup on session close.
    ClearServerSession {
        handle: String,
    },
    /// Remove the persisted snapshot.
    ClearSnapshot,
}

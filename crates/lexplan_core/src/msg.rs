use std::fmt;

use crate::state::{DraftTask, ExecutionMode, JobKind, QueueStatusData, QueueTask};
use crate::SessionSnapshot;

/// The request that a transport-level failure belongs to. Routing of the
/// resulting error depends on which operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedOp {
    CreatePlan,
    ExecutePlan,
    Decompose,
    GeneratePlans,
    ExecuteQueue,
    QueueEdit,
    StatusPull,
}

impl fmt::Display for FailedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailedOp::CreatePlan => "plan creation",
            FailedOp::ExecutePlan => "plan execution",
            FailedOp::Decompose => "query decomposition",
            FailedOp::GeneratePlans => "batch plan generation",
            FailedOp::ExecuteQueue => "queue execution",
            FailedOp::QueueEdit => "queue update",
            FailedOp::StatusPull => "status check",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    // User intents.
    /// User edited the query input box.
    QueryChanged(String),
    /// Submit the current query for single-plan creation.
    SubmitQuery,
    /// Add the current query to the server-side queue.
    AddToQueue,
    /// Ask the server to decompose the current query into sub-tasks.
    DecomposeQuery,
    /// Execute the previewed plan.
    ExecutePlan,
    /// Generate plans for every queued task (batch mode).
    GeneratePlans,
    /// Execute the whole queue.
    ExecuteQueue {
        notification_email: Option<String>,
        terms_accepted: bool,
    },
    /// Remove one task from the queue. Idempotent server-side.
    RemoveTask { task_id: String },
    /// Toggle review vs direct execution chaining.
    SetExecutionMode(ExecutionMode),
    /// Record notification preferences for later plan execution.
    SetNotificationPrefs {
        email: Option<String>,
        terms_accepted: bool,
    },
    /// Close the queue view, clearing completed tasks server-side.
    CloseQueue,
    /// Close the session entirely and destroy persisted state.
    CloseSession,
    /// Apply a persisted snapshot at session open.
    RestoreSession(SessionSnapshot),

    // Engine feedback.
    /// A job-creating call was accepted; `handle` is now the tracked job.
    JobAccepted { kind: JobKind, handle: String },
    /// Non-terminal status update for a tracked job.
    JobStatus {
        handle: String,
        status: QueueStatusData,
    },
    /// Terminal outcome for a tracked job, from either channel.
    JobTerminal {
        handle: String,
        outcome: Result<serde_json::Value, String>,
    },
    /// Authoritative queue contents after a refresh.
    QueueRefreshed(Vec<QueueTask>),
    /// Decomposition finished; may be empty.
    DecompositionReady(Vec<DraftTask>),
    /// A direct request/response call failed at the transport level.
    RequestFailed { op: FailedOp, message: String },
    /// The settle timer for entering `QueueResults` elapsed.
    SettleElapsed { generation: u64 },
    /// Fallback for placeholder wiring.
    NoOp,
}

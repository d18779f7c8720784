use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response payload: {0}")]
    Decode(String),
    #[error("server rejected the request")]
    Rejected,
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        return ServiceError::Timeout;
    }
    if err.is_decode() {
        return ServiceError::Decode(err.to_string());
    }
    ServiceError::Network(err.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    CreatePlan,
    ExecutePlan,
    GeneratePlans,
    ExecuteQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Single,
    Queue,
}

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

/// Events the engine reports back to the host over the event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    JobAccepted {
        kind: JobKind,
        handle: String,
    },
    /// Non-terminal status frame from the push channel.
    Status {
        handle: String,
        frame: StatusFrame,
    },
    /// Terminal outcome, from either the push channel or a pull.
    JobTerminal {
        handle: String,
        outcome: Result<serde_json::Value, String>,
    },
    QueueRefreshed(Vec<TaskRecord>),
    Decomposition(Vec<DraftTask>),
    RequestFailed {
        op: FailedOp,
        message: String,
    },
    SettleElapsed {
        generation: u64,
    },
}

/// One event on a job's push stream. A `result` or `error` field marks it
/// terminal; the subscription closes as soon as one is seen.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusFrame {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusFrame {
    pub fn terminal_outcome(&self) -> Option<Result<serde_json::Value, String>> {
        if let Some(error) = &self.error {
            return Some(Err(error.clone()));
        }
        self.result.clone().map(Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Completed,
    Failed,
}

/// Response to an authoritative `getJobStatus` pull.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobState,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusResponse {
    pub fn terminal_outcome(&self) -> Option<Result<serde_json::Value, String>> {
        match self.status {
            JobState::Pending => None,
            JobState::Completed => Some(Ok(self
                .result
                .clone()
                .unwrap_or(serde_json::Value::Null))),
            JobState::Failed => Some(Err(self
                .error
                .clone()
                .unwrap_or_else(|| "job failed".to_string()))),
        }
    }
}

/// Acknowledgement for any job-creating call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedJob {
    pub success: bool,
    pub job_id: String,
}

/// A queue task as reported by the Queue Service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub query: String,
    pub status: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// A sub-task suggestion returned by query decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DraftTask {
    pub query: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Descriptive fields attached to a queue task on add.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TaskMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Wire form of notification preferences; only sent complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPrefs {
    pub email: String,
    pub terms_accepted: bool,
}

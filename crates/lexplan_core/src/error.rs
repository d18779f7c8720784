use thiserror::Error;

use crate::msg::FailedOp;

/// Errors surfaced to the user as a message attached to the current stage.
/// None of these are thrown across the workflow boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("no plan is available to execute")]
    MissingPlan,
    #[error("the query could not be decomposed into sub-tasks")]
    EmptyDecomposition,
    /// The server reported the job failed; the payload message is shown as-is.
    #[error("{0}")]
    Job(String),
    #[error("{op} failed: {message}")]
    Transport { op: FailedOp, message: String },
}

use serde::{Deserialize, Serialize};

use crate::state::{PlanData, WorkflowStage};

/// Schema version tag for persisted snapshots. Any stored record carrying a
/// different value is discarded on load, never migrated.
pub const SCHEMA_VERSION: &str = "2.0";

/// The whole-session record written to the durable store on every state
/// change. Always written as a complete object, never as a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub version: String,
    #[serde(default)]
    pub query: String,
    pub current_step: WorkflowStage,
    #[serde(default)]
    pub plan_data: Option<PlanData>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub is_queue_mode: bool,
    #[serde(default)]
    pub notification_email: Option<String>,
    #[serde(default)]
    pub terms_accepted: bool,
    #[serde(default)]
    pub timestamp: String,
}

impl SessionSnapshot {
    pub fn is_current_version(&self) -> bool {
        self.version == SCHEMA_VERSION
    }
}

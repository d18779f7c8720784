use reqwest::StatusCode;

use crate::jobs::{check_status, created_job};
use crate::types::{map_reqwest_error, ServiceError, TaskMetadata, TaskRecord};
use crate::EngineConfig;

/// Client surface of the Queue Service. The server owns the task list; every
/// mutation here is followed by an authoritative `list` by the engine.
#[async_trait::async_trait]
pub trait QueueService: Send + Sync {
    async fn list(&self) -> Result<Vec<TaskRecord>, ServiceError>;
    async fn add(&self, query: &str, metadata: Option<&TaskMetadata>) -> Result<(), ServiceError>;
    /// Idempotent: removing an unknown id leaves the queue unchanged.
    async fn remove(&self, task_id: &str) -> Result<(), ServiceError>;
    async fn generate_plans(&self) -> Result<String, ServiceError>;
    async fn execute(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> Result<String, ServiceError>;
    async fn clear_completed(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct HttpQueueService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueueService {
    pub fn new(config: &EngineConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ServiceError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait::async_trait]
impl QueueService for HttpQueueService {
    async fn list(&self) -> Result<Vec<TaskRecord>, ServiceError> {
        #[derive(serde::Deserialize)]
        struct ListResponse {
            tasks: Vec<TaskRecord>,
        }

        let response = self
            .client
            .get(self.url("/api/queue/tasks"))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)?;
        let listed: ListResponse = response.json().await.map_err(map_reqwest_error)?;
        Ok(listed.tasks)
    }

    async fn add(&self, query: &str, metadata: Option<&TaskMetadata>) -> Result<(), ServiceError> {
        let mut body = serde_json::json!({ "query": query });
        if let Some(metadata) = metadata {
            body["metadata"] = serde_json::json!(metadata);
        }
        let response = self
            .client
            .post(self.url("/api/queue/tasks"))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)
    }

    async fn remove(&self, task_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/queue/tasks/{task_id}")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        // Mirrors server semantics: deleting a task that is already gone is
        // not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(&response)
    }

    async fn generate_plans(&self) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.url("/api/queue/plans"))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        created_job(response).await
    }

    async fn execute(
        &self,
        notification_email: Option<&str>,
        terms_accepted: bool,
    ) -> Result<String, ServiceError> {
        let mut body = serde_json::json!({ "terms_accepted": terms_accepted });
        if let Some(email) = notification_email {
            body["notification_email"] = serde_json::json!(email);
        }
        let response = self
            .client
            .post(self.url("/api/queue/execute"))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        created_job(response).await
    }

    async fn clear_completed(&self) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.url("/api/queue/completed"))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)
    }
}

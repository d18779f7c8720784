use crate::types::{
    map_reqwest_error, CreatedJob, DraftTask, JobStatusResponse, NotificationPrefs, ServiceError,
};
use crate::EngineConfig;

/// Client surface of the Job Service: plan creation/execution, status pulls,
/// query decomposition and best-effort session cleanup.
#[async_trait::async_trait]
pub trait JobService: Send + Sync {
    async fn create_plan(&self, query: &str) -> Result<String, ServiceError>;
    async fn execute_plan(
        &self,
        plan_id: &str,
        prefs: Option<&NotificationPrefs>,
    ) -> Result<String, ServiceError>;
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ServiceError>;
    async fn decompose(&self, query: &str) -> Result<Vec<DraftTask>, ServiceError>;
    async fn clear_session(&self, job_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct HttpJobService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobService {
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

/// Parses a job-creating response, mapping `success: false` to `Rejected`.
pub(crate) async fn created_job(response: reqwest::Response) -> Result<String, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::HttpStatus(status.as_u16()));
    }
    let created: CreatedJob = response.json().await.map_err(map_reqwest_error)?;
    if !created.success {
        return Err(ServiceError::Rejected);
    }
    Ok(created.job_id)
}

pub(crate) fn check_status(response: &reqwest::Response) -> Result<(), ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ServiceError::HttpStatus(status.as_u16()))
    }
}

#[async_trait::async_trait]
impl JobService for HttpJobService {
    async fn create_plan(&self, query: &str) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.url("/api/analysis/plan"))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        created_job(response).await
    }

    async fn execute_plan(
        &self,
        plan_id: &str,
        prefs: Option<&NotificationPrefs>,
    ) -> Result<String, ServiceError> {
        let mut body = serde_json::json!({ "plan_id": plan_id });
        if let Some(prefs) = prefs {
            body["notification_preferences"] = serde_json::json!(prefs);
        }
        let response = self
            .client
            .post(self.url("/api/analysis/execute"))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        created_job(response).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("/api/analysis/jobs/{job_id}")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)?;
        response.json().await.map_err(map_reqwest_error)
    }

    async fn decompose(&self, query: &str) -> Result<Vec<DraftTask>, ServiceError> {
        #[derive(serde::Deserialize)]
        struct DecomposeResponse {
            success: bool,
            #[serde(default)]
            tasks: Vec<DraftTask>,
        }

        let response = self
            .client
            .post(self.url("/api/analysis/decompose"))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)?;
        let decomposed: DecomposeResponse = response.json().await.map_err(map_reqwest_error)?;
        if !decomposed.success {
            return Err(ServiceError::Rejected);
        }
        Ok(decomposed.tasks)
    }

    async fn clear_session(&self, job_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/analysis/session/{job_id}")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)
    }
}

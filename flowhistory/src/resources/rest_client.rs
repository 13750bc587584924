use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::constants::LAST_VERSION_HEADER;
use crate::errors::FlowHistoryError;
use crate::models::version::VersionSnapshot;
use crate::models::workflow::EntityType;
use crate::resources::concurrency_guard::LastVersionToken;
use crate::resources::workflow_api::WorkflowApi;

/// HTTP client for the workflow backend.
pub struct RestWorkflowApi {
    client: reqwest::Client,
    base_url: String,
}

impl RestWorkflowApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FlowHistoryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/workflows/{}", self.base_url, path)
    }

    fn entity_url(&self, workflow_id: &str, entity_type: EntityType, entity_id: &str) -> String {
        self.url(&format!("{}/{}/{}", workflow_id, entity_type.collection(), entity_id))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        workflow_id: &str,
        token: Option<&LastVersionToken>,
    ) -> Result<reqwest::Response, FlowHistoryError> {
        let request = match token {
            Some(token) => request.header(LAST_VERSION_HEADER, token.to_string()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        debug!("RestWorkflowApi::workflow {} responded {}: {}", workflow_id, status, body);

        Err(status_error(workflow_id, token, status, body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        workflow_id: &str,
        token: Option<&LastVersionToken>,
    ) -> Result<T, FlowHistoryError> {
        let response = self.send(request, workflow_id, token).await?;

        Ok(response.json::<T>().await?)
    }
}

/// Maps a non-2xx backend response to the matching error.
fn status_error(
    workflow_id: &str,
    token: Option<&LastVersionToken>,
    status: StatusCode,
    body: String,
) -> FlowHistoryError {
    match status {
        StatusCode::NOT_FOUND => FlowHistoryError::NotFound(format!("workflow {}: {}", workflow_id, body)),
        StatusCode::CONFLICT => {
            let current = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| value.get("currentVersion").and_then(Value::as_i64))
                .unwrap_or(-1);

            FlowHistoryError::VersionConflict {
                workflow_id: workflow_id.to_string(),
                provided: token.map(LastVersionToken::version).unwrap_or(-1),
                current,
            }
        }
        _ => FlowHistoryError::BackendError {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl WorkflowApi for RestWorkflowApi {
    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<VersionSnapshot>, FlowHistoryError> {
        let request = self.client.get(self.url(&format!("{}/versions", workflow_id)));

        self.send_json(request, workflow_id, None).await
    }

    async fn get_version(&self, workflow_id: &str, version: i64) -> Result<VersionSnapshot, FlowHistoryError> {
        let request = self
            .client
            .get(self.url(&format!("{}/versions/{}", workflow_id, version)));

        self.send_json(request, workflow_id, None).await
    }

    async fn create_version(
        &self,
        workflow_id: &str,
        token: &LastVersionToken,
    ) -> Result<VersionSnapshot, FlowHistoryError> {
        let request = self.client.post(self.url(&format!("{}/versions", workflow_id)));

        self.send_json(request, workflow_id, Some(token)).await
    }

    async fn update_workflow(
        &self,
        workflow_id: &str,
        fields: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let request = self.client.put(self.url(workflow_id)).json(fields);
        self.send(request, workflow_id, Some(token)).await?;

        Ok(())
    }

    async fn create_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        payload: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let body = json!({
            "id": entity_id,
            "type": entity_type,
            "payload": payload,
        });
        let request = self
            .client
            .post(self.url(&format!("{}/{}", workflow_id, entity_type.collection())))
            .json(&body);
        self.send(request, workflow_id, Some(token)).await?;

        Ok(())
    }

    async fn upsert_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        payload: &Value,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let body = json!({
            "id": entity_id,
            "type": entity_type,
            "payload": payload,
        });
        let request = self
            .client
            .put(self.entity_url(workflow_id, entity_type, entity_id))
            .json(&body);
        self.send(request, workflow_id, Some(token)).await?;

        Ok(())
    }

    async fn delete_entity(
        &self,
        workflow_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        token: &LastVersionToken,
    ) -> Result<(), FlowHistoryError> {
        let request = self.client.delete(self.entity_url(workflow_id, entity_type, entity_id));

        match self.send(request, workflow_id, Some(token)).await {
            // already gone
            Err(FlowHistoryError::NotFound(_)) => Ok(()),
            result => result.map(|_| ()),
        }
    }
}

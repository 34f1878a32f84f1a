// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crewlink_core::domain::agent::{AgentFilter, AgentId, AgentRecord, AgentRegistration, HeartbeatRequest};
use crewlink_core::presentation::API_KEY_HEADER;
use crewlink_swarm::application::{ExecutionReceipt, WorkflowTicket};
use crewlink_swarm::domain::{CrewId, CrewView, HandoffReceipt, HandoffRequest, PhaseReadiness, TaskEntry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A non-success response from the orchestrator, decoded from its
/// `{"error": {"kind", "message"}}` body when present.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{action} failed ({status} {kind}): {message}")]
pub struct ApiFailure {
    pub action: String,
    pub status: u16,
    pub kind: String,
    pub message: String,
}

impl ApiFailure {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Whether `err` is an orchestrator 404.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiFailure>()
        .map(ApiFailure::is_not_found)
        .unwrap_or(false)
}

/// Client for the orchestrator's HTTP API.
#[derive(Debug, Clone)]
pub struct FabricClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FabricClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // Per-request timeouts only; bus subscriptions are long-lived streams.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Set the API key sent as `X-API-Key`.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request without a timeout, with the API key attached.
    pub(crate) fn streaming(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.streaming(method, path).timeout(REQUEST_TIMEOUT)
    }

    pub async fn health(&self) -> Result<Value> {
        let response = self
            .request(Method::GET, "/health")
            .send()
            .await
            .context("Failed to reach orchestrator")?;
        decode(response, "health check").await
    }

    pub async fn register(&self, registration: &AgentRegistration) -> Result<AgentRecord> {
        let response = self
            .request(Method::POST, "/agents/register")
            .json(registration)
            .send()
            .await
            .context("Failed to register agent")?;
        decode(response, "register").await
    }

    pub async fn heartbeat(&self, agent_id: AgentId, status: Option<&str>, load: Option<f64>) -> Result<AgentRecord> {
        let body = HeartbeatRequest {
            agent_id,
            status: status.map(String::from),
            load,
        };
        let response = self
            .request(Method::POST, "/agents/heartbeat")
            .json(&body)
            .send()
            .await
            .context("Failed to send heartbeat")?;
        decode(response, "heartbeat").await
    }

    pub async fn deregister(&self, agent_id: AgentId) -> Result<AgentRecord> {
        let response = self
            .request(Method::DELETE, &format!("/agents/{agent_id}"))
            .send()
            .await
            .context("Failed to deregister agent")?;
        decode(response, "deregister").await
    }

    pub async fn agent(&self, agent_id: AgentId) -> Result<AgentRecord> {
        let response = self
            .request(Method::GET, &format!("/agents/{agent_id}"))
            .send()
            .await
            .context("Failed to fetch agent")?;
        decode(response, "get agent").await
    }

    pub async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if !filter.tags.is_empty() {
            query.append_pair("tag", &filter.tags.join(","));
        }
        if let Some(status) = filter.status {
            query.append_pair("status", status.as_str());
        }
        let query = query.finish();
        let path = if query.is_empty() {
            "/agents/status".to_string()
        } else {
            format!("/agents/status?{query}")
        };

        let response = self
            .request(Method::GET, &path)
            .send()
            .await
            .context("Failed to list agents")?;
        decode(response, "list agents").await
    }

    pub async fn crew(&self) -> Result<CrewView> {
        let response = self
            .request(Method::GET, "/crew")
            .send()
            .await
            .context("Failed to fetch crew")?;
        decode(response, "get crew").await
    }

    pub async fn crew_by_id(&self, crew_id: CrewId) -> Result<CrewView> {
        let response = self
            .request(Method::GET, &format!("/crews/{crew_id}"))
            .send()
            .await
            .context("Failed to fetch crew")?;
        decode(response, "get crew").await
    }

    pub async fn assemble(&self, roles: &[String], mission: &str, name: Option<&str>) -> Result<CrewView> {
        let body = json!({
            "agent_roles": roles,
            "mission_description": mission,
            "name": name,
        });
        let response = self
            .request(Method::POST, "/crews/assemble")
            .json(&body)
            .send()
            .await
            .context("Failed to assemble crew")?;
        decode(response, "assemble").await
    }

    pub async fn transition(&self, phase: &str, force: bool, require_ready: bool) -> Result<CrewView> {
        let path = format!("/phase/{phase}?force={force}&require_ready={require_ready}");
        let response = self
            .request(Method::POST, &path)
            .send()
            .await
            .context("Failed to change phase")?;
        decode(response, "phase transition").await
    }

    pub async fn phase_readiness(&self, phase: &str) -> Result<PhaseReadiness> {
        let response = self
            .request(Method::GET, &format!("/phase/{phase}/readiness"))
            .send()
            .await
            .context("Failed to check phase readiness")?;
        decode(response, "phase readiness").await
    }

    pub async fn handoff(&self, request: &HandoffRequest) -> Result<HandoffReceipt> {
        let response = self
            .request(Method::POST, "/handoff")
            .json(request)
            .send()
            .await
            .context("Failed to submit handoff")?;
        decode(response, "handoff").await
    }

    pub async fn plan(&self, task: &str, context: Value) -> Result<TaskEntry> {
        let response = self
            .request(Method::POST, "/plan")
            .json(&json!({ "task": task, "context": context }))
            .send()
            .await
            .context("Failed to plan task")?;
        decode(response, "plan").await
    }

    pub async fn task(&self, task_id: &str) -> Result<TaskEntry> {
        let response = self
            .request(Method::GET, &format!("/tasks/{task_id}"))
            .send()
            .await
            .context("Failed to fetch task")?;
        decode(response, "get task").await
    }

    pub async fn start_workflow(&self, workflow_type: &str, description: &str) -> Result<WorkflowTicket> {
        let response = self
            .request(Method::POST, &format!("/workflow/{workflow_type}"))
            .json(&json!({ "description": description }))
            .send()
            .await
            .context("Failed to start workflow")?;
        decode(response, "start workflow").await
    }

    pub async fn execute(&self, role: &str, message: &str, context: Value) -> Result<ExecutionReceipt> {
        let response = self
            .request(Method::POST, &format!("/agent/{role}/execute"))
            .json(&json!({ "message": message, "context": context }))
            .send()
            .await
            .context("Failed to dispatch task")?;
        decode(response, "execute").await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    kind: String,
    message: String,
}

pub(crate) async fn decode<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let (kind, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error.kind, body.error.message),
            Err(_) => ("http".to_string(), text),
        };
        return Err(ApiFailure {
            action: action.to_string(),
            status: status.as_u16(),
            kind,
            message,
        }
        .into());
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {action} response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn record_json(id: AgentId, status: &str) -> String {
        json!({
            "id": id,
            "name": "Coder",
            "description": "",
            "version": "1.0.0",
            "endpoint": "http://coder:8000",
            "tags": ["code"],
            "capabilities": [],
            "status": status,
            "last_heartbeat": "2026-01-01T00:00:00Z",
            "load": 0.0,
            "registered_at": "2026-01-01T00:00:00Z"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_register_sends_api_key() {
        let mut server = mockito::Server::new_async().await;
        let id = AgentId::new();
        let mock = server
            .mock("POST", "/agents/register")
            .match_header("x-api-key", "secret")
            .match_body(Matcher::PartialJson(json!({"name": "Coder"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(record_json(id, "registered"))
            .create_async()
            .await;

        let client = FabricClient::new(server.url())
            .unwrap()
            .with_api_key(Some("secret".into()));
        let record = client
            .register(&AgentRegistration {
                name: "Coder".into(),
                endpoint: "http://coder:8000".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(record.id, id);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/agents/heartbeat")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"kind":"not_found","message":"agent not found: x"}}"#)
            .create_async()
            .await;

        let client = FabricClient::new(server.url()).unwrap();
        let err = client.heartbeat(AgentId::new(), Some("active"), None).await.unwrap_err();

        assert!(is_not_found(&err));
        let failure = err.downcast_ref::<ApiFailure>().unwrap();
        assert_eq!(failure.kind, "not_found");
        assert_eq!(failure.action, "heartbeat");
    }

    #[tokio::test]
    async fn test_list_agents_encodes_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/agents/status")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("tag".into(), "code,python".into()),
                Matcher::UrlEncoded("status".into(), "active".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{}]", record_json(AgentId::new(), "active")))
            .create_async()
            .await;

        let client = FabricClient::new(format!("{}/", server.url())).unwrap();
        let agents = client
            .list_agents(&AgentFilter {
                tags: vec!["code".into(), "python".into()],
                status: Some(crewlink_core::domain::agent::AgentStatus::Active),
            })
            .await
            .unwrap();

        assert_eq!(agents.len(), 1);
        mock.assert_async().await;
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP routes for the registry and the remote bus.
//
// The router is returned with its state applied so the daemon can merge it
// with the crew routes from crewlink-swarm before adding auth and tracing.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use crate::application::registry::AgentRegistry;
use crate::domain::agent::{AgentFilter, AgentId, AgentRecord, AgentRegistration, AgentStatus, HeartbeatRequest};
use crate::domain::error::FabricError;
use crate::domain::events::Event;
use crate::infrastructure::channel_hub::ChannelHub;
use crate::infrastructure::event_bus::EventBus;
use crate::presentation::channel::channel_handler;
use crate::presentation::error::{ApiError, ApiJson, ApiQuery, ApiResult};

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct FabricState {
    pub registry: Arc<AgentRegistry>,
    pub bus: EventBus,
    pub hub: ChannelHub,
    pub start_time: Instant,
}

impl FabricState {
    pub fn new(registry: Arc<AgentRegistry>, bus: EventBus, hub: ChannelHub) -> Self {
        Self {
            registry,
            bus,
            hub,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: FabricState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/agents/register", post(register_handler))
        .route("/agents/heartbeat", post(heartbeat_handler))
        .route("/agents/status", get(list_handler))
        .route("/agents/{id}", get(get_agent_handler).delete(deregister_handler))
        .route("/agents/{id}/channel", get(channel_handler))
        .route("/bus/topics/{topic}", post(publish_handler))
        .route("/bus/topics/{topic}/events", get(subscribe_handler))
        .with_state(state)
}

/// Require `X-API-Key` on every route except `/health` when a key is set.
pub fn protect(router: Router, api_key: Option<String>) -> Router {
    match api_key {
        Some(key) => router.layer(middleware::from_fn_with_state(
            Arc::<str>::from(key),
            require_api_key,
        )),
        None => router,
    }
}

async fn require_api_key(State(expected): State<Arc<str>>, request: Request, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided == Some(&*expected) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected request without valid API key");
        ApiError(FabricError::Unauthorized).into_response()
    }
}

pub(crate) fn parse_agent_id(raw: &str) -> Result<AgentId, FabricError> {
    AgentId::from_string(raw)
        .map_err(|_| FabricError::Validation(format!("'{raw}' is not a valid agent id")))
}

async fn health_handler(State(state): State<FabricState>) -> ApiResult<Json<serde_json::Value>> {
    let agents = state.registry.list(&AgentFilter::default()).await?;
    let count = |status: AgentStatus| agents.iter().filter(|a| a.status == status).count();

    Ok(Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "agents": {
            "registered": count(AgentStatus::Registered),
            "active": count(AgentStatus::Active),
            "unreachable": count(AgentStatus::Unreachable),
        },
        "connected_channels": state.hub.connected_count(),
    })))
}

async fn register_handler(
    State(state): State<FabricState>,
    ApiJson(registration): ApiJson<AgentRegistration>,
) -> ApiResult<(StatusCode, Json<AgentRecord>)> {
    let record = state.registry.register(registration).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn heartbeat_handler(
    State(state): State<FabricState>,
    ApiJson(request): ApiJson<HeartbeatRequest>,
) -> ApiResult<Json<AgentRecord>> {
    let record = state
        .registry
        .heartbeat(request.agent_id, request.status.as_deref(), request.load)
        .await?;
    Ok(Json(record))
}

async fn deregister_handler(
    State(state): State<FabricState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentRecord>> {
    let record = state.registry.deregister(parse_agent_id(&id)?).await?;
    Ok(Json(record))
}

async fn get_agent_handler(
    State(state): State<FabricState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentRecord>> {
    let record = state.registry.get(parse_agent_id(&id)?).await?;
    Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma-separated; all must match.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<AgentFilter, FabricError> {
        let tags = self
            .tag
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let status = self
            .status
            .map(|raw| raw.parse::<AgentStatus>().map_err(FabricError::Validation))
            .transpose()?;
        Ok(AgentFilter { tags, status })
    }
}

async fn list_handler(
    State(state): State<FabricState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Vec<AgentRecord>>> {
    let records = state.registry.list(&query.into_filter()?).await?;
    Ok(Json(records))
}

async fn publish_handler(
    State(state): State<FabricState>,
    Path(topic): Path<String>,
    ApiJson(event): ApiJson<Event>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let delivered = state.bus.publish_event(&topic, &event).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "event_id": event.id, "delivered": delivered })),
    ))
}

async fn subscribe_handler(
    State(state): State<FabricState>,
    Path(topic): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    // Subscribe before responding so nothing published after the response
    // headers are sent is missed.
    let messages = state.bus.subscribe_raw(&topic).await?;
    tracing::debug!(topic = %topic, "Remote subscriber attached");

    let stream = messages.map(|message| Ok(SseEvent::default().data(message)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> FabricState {
        let bus = EventBus::in_memory(16, "orchestrator");
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(InMemoryAgentRepository::new()),
            bus.clone(),
            Duration::from_secs(90),
        ));
        FabricState::new(registry, bus, ChannelHub::new())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_query_parses_tags_and_status() {
        let filter = ListQuery {
            tag: Some("code, python".into()),
            status: Some("active".into()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.tags, vec!["code", "python"]);
        assert_eq!(filter.status, Some(AgentStatus::Active));

        let err = ListQuery {
            tag: None,
            status: Some("asleep".into()),
        }
        .into_filter()
        .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_api_key_guards_everything_but_health() {
        let app = protect(router(state()), Some("secret".into()));

        let health = app
            .clone()
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let denied = app
            .clone()
            .oneshot(HttpRequest::get("/agents/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(denied).await["error"]["kind"], "unauthorized");

        let allowed = app
            .oneshot(
                HttpRequest::get("/agents/status")
                    .header("X-API-Key", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        let app = router(state());

        let response = app
            .clone()
            .oneshot(
                HttpRequest::post("/agents/register")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Coder","endpoint":"http://coder:8000","tags":"code"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "validation");
        assert!(body["error"]["message"].as_str().unwrap().contains("tags"));

        let response = app
            .oneshot(
                HttpRequest::post("/agents/heartbeat")
                    .body(Body::from(r#"{"agent_id":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_bad_agent_id_is_validation_error() {
        let response = router(state())
            .oneshot(HttpRequest::get("/agents/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["kind"], "validation");
    }
}

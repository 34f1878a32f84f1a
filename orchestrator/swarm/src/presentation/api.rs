// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Crew routes. Merged into the daemon router next to the registry routes, so
// auth and tracing layers are applied there.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crewlink_core::domain::error::FabricError;
use crewlink_core::presentation::error::{ApiJson, ApiQuery, ApiResult};

use crate::application::orchestrator::{CrewOrchestrator, ExecutionReceipt, WorkflowTicket};
use crate::domain::crew::{CrewId, CrewView, PhaseReadiness};
use crate::domain::handoff::{HandoffReceipt, HandoffRequest};
use crate::domain::phase::Phase;
use crate::domain::task::TaskEntry;

pub fn router(orchestrator: Arc<CrewOrchestrator>) -> Router {
    Router::new()
        .route("/crews/assemble", post(assemble_handler))
        .route("/crews/{id}", get(crew_by_id_handler))
        .route("/crew", get(crew_handler))
        .route("/phase/{name}", post(phase_handler))
        .route("/phase/{name}/readiness", get(readiness_handler))
        .route("/handoff", post(handoff_handler))
        .route("/plan", post(plan_handler))
        .route("/tasks/{id}", get(task_handler))
        .route("/workflow/{workflow_type}", post(workflow_handler))
        .route("/agent/{role}/execute", post(execute_handler))
        .with_state(orchestrator)
}

#[derive(Debug, Deserialize)]
pub struct AssembleRequest {
    pub agent_roles: Vec<String>,
    #[serde(default)]
    pub mission_description: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhaseQuery {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub require_ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub task: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

fn context_value(context: Option<Map<String, Value>>) -> Value {
    Value::Object(context.unwrap_or_default())
}

async fn assemble_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    ApiJson(request): ApiJson<AssembleRequest>,
) -> ApiResult<Json<CrewView>> {
    let crew = orchestrator
        .assemble(&request.agent_roles, &request.mission_description, request.name)
        .await?;
    Ok(Json(crew))
}

async fn crew_by_id_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CrewView>> {
    let crew_id = CrewId::from_string(&id)
        .map_err(|_| FabricError::Validation(format!("'{id}' is not a valid crew id")))?;
    Ok(Json(orchestrator.crew_by_id(crew_id).await?))
}

async fn crew_handler(State(orchestrator): State<Arc<CrewOrchestrator>>) -> ApiResult<Json<CrewView>> {
    Ok(Json(orchestrator.crew().await?))
}

async fn phase_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    Path(name): Path<String>,
    ApiQuery(query): ApiQuery<PhaseQuery>,
) -> ApiResult<Json<CrewView>> {
    let phase: Phase = name.parse()?;
    let crew = orchestrator
        .transition(phase, query.force, query.require_ready)
        .await?;
    Ok(Json(crew))
}

async fn readiness_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    Path(name): Path<String>,
) -> ApiResult<Json<PhaseReadiness>> {
    let phase: Phase = name.parse()?;
    Ok(Json(orchestrator.readiness(phase).await?))
}

async fn handoff_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    ApiJson(request): ApiJson<HandoffRequest>,
) -> ApiResult<Json<HandoffReceipt>> {
    Ok(Json(orchestrator.handoff(request).await?))
}

async fn plan_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    ApiJson(request): ApiJson<PlanRequest>,
) -> ApiResult<Json<TaskEntry>> {
    let entry = orchestrator
        .plan(&request.task, context_value(request.context))
        .await?;
    Ok(Json(entry))
}

async fn task_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskEntry>> {
    Ok(Json(orchestrator.task(&id)?))
}

async fn workflow_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    Path(workflow_type): Path<String>,
    ApiJson(request): ApiJson<WorkflowRequest>,
) -> ApiResult<Json<WorkflowTicket>> {
    let ticket = orchestrator
        .start_workflow(&workflow_type, &request.description)
        .await?;
    Ok(Json(ticket))
}

async fn execute_handler(
    State(orchestrator): State<Arc<CrewOrchestrator>>,
    Path(role): Path<String>,
    ApiJson(request): ApiJson<ExecuteRequest>,
) -> ApiResult<Json<ExecutionReceipt>> {
    let receipt = orchestrator
        .execute(&role, &request.message, context_value(request.context))
        .await?;
    Ok(Json(receipt))
}

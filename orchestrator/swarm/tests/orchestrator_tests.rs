// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use crewlink_core::application::registry::AgentRegistry;
use crewlink_core::domain::agent::{AgentId, AgentRegistration};
use crewlink_core::domain::events::topics;
use crewlink_core::infrastructure::channel_hub::ChannelHub;
use crewlink_core::infrastructure::event_bus::EventBus;
use crewlink_core::infrastructure::repositories::InMemoryAgentRepository;
use crewlink_swarm::application::CrewOrchestrator;
use crewlink_swarm::domain::{HandoffRequest, Phase, Readiness, TaskStatus};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

struct Fabric {
    registry: Arc<AgentRegistry>,
    bus: EventBus,
    hub: ChannelHub,
    orchestrator: Arc<CrewOrchestrator>,
}

fn fabric() -> Fabric {
    let bus = EventBus::in_memory(64, "orchestrator");
    let hub = ChannelHub::new();
    let registry = Arc::new(AgentRegistry::new(
        Arc::new(InMemoryAgentRepository::new()),
        bus.clone(),
        Duration::from_secs(90),
    ));
    let orchestrator = Arc::new(CrewOrchestrator::with_defaults(
        registry.clone(),
        bus.clone(),
        hub.clone(),
    ));
    Fabric {
        registry,
        bus,
        hub,
        orchestrator,
    }
}

async fn active_agent(registry: &AgentRegistry, name: &str, tags: &[&str]) -> AgentId {
    let record = registry
        .register(AgentRegistration {
            name: name.into(),
            endpoint: format!("http://{}:8000", name.to_lowercase()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
        .await
        .unwrap();
    registry.heartbeat(record.id, Some("active"), Some(0.0)).await.unwrap();
    record.id
}

fn handoff(source: AgentId, target: AgentId) -> HandoffRequest {
    let mut context = Map::new();
    context.insert("branch".into(), json!("feature/login"));
    HandoffRequest {
        source_agent: source,
        target_agent: target,
        task_id: "task-login".into(),
        context,
        artifacts: vec!["src/login.rs".into(), "tests/login.rs".into()],
        crew_id: None,
    }
}

#[tokio::test]
async fn test_assemble_seats_requested_roles() {
    let f = fabric();
    let frontend = active_agent(&f.registry, "Frontend", &["frontend_specialist"]).await;
    let backend = active_agent(&f.registry, "Backend", &["backend_specialist"]).await;
    let mut missions = f.bus.subscribe(topics::CREW_MISSIONS).await.unwrap();

    let crew = f
        .orchestrator
        .assemble(
            &["frontend_specialist".into(), "backend_specialist".into()],
            "Build login form",
            None,
        )
        .await
        .unwrap();

    assert_eq!(crew.members.len(), 2);
    assert_eq!(crew.members[0].agent_id, frontend);
    assert_eq!(crew.members[1].agent_id, backend);
    assert_eq!(crew.phase, f.orchestrator.current_phase());
    assert_eq!(crew.mission.as_deref(), Some("Build login form"));
    assert_eq!(crew.readiness, Readiness::Ready);

    let event = timeout(Duration::from_secs(1), missions.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.message_type, "mission_started");
    assert_eq!(event.payload["crew_id"], json!(crew.id));

    let fetched = f.orchestrator.crew_by_id(crew.id).await.unwrap();
    assert_eq!(fetched.members.len(), 2);
}

#[tokio::test]
async fn test_oldest_ad_hoc_crew_is_evicted_over_limit() {
    let registry = Arc::new(AgentRegistry::new(
        Arc::new(InMemoryAgentRepository::new()),
        EventBus::in_memory(16, "orchestrator"),
        Duration::from_secs(90),
    ));
    let orchestrator = CrewOrchestrator::with_defaults(
        registry,
        EventBus::in_memory(16, "orchestrator"),
        ChannelHub::new(),
    )
    .with_retention(2, 100);
    let phase_crew = orchestrator.crew().await.unwrap().id;
    let roles = vec!["qa_engineer".to_string()];

    let first = orchestrator.assemble(&roles, "one", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = orchestrator.assemble(&roles, "two", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let third = orchestrator.assemble(&roles, "three", None).await.unwrap();

    let err = orchestrator.crew_by_id(first.id).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(orchestrator.crew_by_id(second.id).await.is_ok());
    assert!(orchestrator.crew_by_id(third.id).await.is_ok());
    assert_eq!(orchestrator.crew().await.unwrap().id, phase_crew);
}

#[tokio::test]
async fn test_assemble_rejects_empty_roles() {
    let f = fabric();
    let err = f.orchestrator.assemble(&[], "Nothing", None).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn test_forced_transition_seats_available_roles() {
    let f = fabric();
    let frontend = active_agent(&f.registry, "Frontend Specialist", &[]).await;
    let mut phases = f.bus.subscribe(topics::CREW_PHASES).await.unwrap();

    let crew = f
        .orchestrator
        .transition(Phase::Development, true, true)
        .await
        .unwrap();

    assert_eq!(f.orchestrator.current_phase(), Phase::Development);
    assert_eq!(crew.readiness, Readiness::Forced);
    assert_eq!(crew.members[0].agent_id, frontend);
    assert_eq!(crew.members[0].role, "frontend_specialist");
    assert_eq!(crew.missing_roles, vec!["backend_specialist"]);
    assert_eq!(crew.gatekeeper.as_deref(), Some("qa_engineer"));

    let event = timeout(Duration::from_secs(1), phases.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.message_type, "phase_changed");
    assert_eq!(event.payload["from"], "planning");
    assert_eq!(event.payload["to"], "development");
}

#[tokio::test]
async fn test_require_ready_keeps_current_phase() {
    let f = fabric();
    active_agent(&f.registry, "Frontend", &["frontend_specialist"]).await;

    let err = f
        .orchestrator
        .transition(Phase::Development, false, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "phase_not_ready");
    assert_eq!(f.orchestrator.current_phase(), Phase::Planning);

    let crew = f
        .orchestrator
        .transition(Phase::Development, false, false)
        .await
        .unwrap();
    assert_eq!(crew.readiness, Readiness::Degraded);
    assert_eq!(f.orchestrator.crew().await.unwrap().id, crew.id);
}

#[tokio::test]
async fn test_readiness_check_changes_nothing() {
    let f = fabric();
    let ops = active_agent(&f.registry, "Ops", &["devops_engineer"]).await;
    let mut phases = f.bus.subscribe(topics::CREW_PHASES).await.unwrap();
    let before = f.orchestrator.crew().await.unwrap();

    let check = f.orchestrator.readiness(Phase::Deployment).await.unwrap();
    assert_eq!(check.readiness, Readiness::Ready);
    assert_eq!(check.current_phase, Phase::Planning);
    assert!(check.missing_roles.is_empty());
    assert_eq!(check.members[0].agent_id, ops);

    let check = f.orchestrator.readiness(Phase::Testing).await.unwrap();
    assert_eq!(check.readiness, Readiness::Degraded);
    assert_eq!(check.missing_roles, vec!["qa_engineer", "security_engineer"]);

    assert_eq!(f.orchestrator.current_phase(), Phase::Planning);
    assert_eq!(f.orchestrator.crew().await.unwrap().id, before.id);
    assert!(timeout(Duration::from_millis(100), phases.next()).await.is_err());
}

#[tokio::test]
async fn test_handoff_publishes_with_task_correlation() {
    let f = fabric();
    let source = active_agent(&f.registry, "Backend", &["backend_specialist"]).await;
    let target = active_agent(&f.registry, "QA", &["qa_engineer"]).await;
    let crew_id = f.orchestrator.crew().await.unwrap().id;
    let mut handoffs = f.bus.subscribe(&topics::crew_handoffs(crew_id)).await.unwrap();
    let (_conn, mut commands) = f.hub.attach(target);

    let receipt = f.orchestrator.handoff(handoff(source, target)).await.unwrap();
    assert!(receipt.delivered);
    assert!(receipt.nudged);
    assert_eq!(receipt.crew_id, crew_id);

    let event = timeout(Duration::from_secs(1), handoffs.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.message_type, "handoff");
    assert_eq!(event.correlation_id.as_deref(), Some("task-login"));
    assert_eq!(event.payload["artifacts"], json!(["src/login.rs", "tests/login.rs"]));
    assert_eq!(event.payload["context"]["branch"], "feature/login");
    assert_eq!(Some(event.id), receipt.event_id);

    let frame: Value = serde_json::from_str(&commands.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "handoff");
    assert_eq!(frame["payload"]["task_id"], "task-login");

    let entry = f.orchestrator.task("task-login").unwrap();
    assert_eq!(entry.status, TaskStatus::HandedOff);
    assert!(entry.handoffs[0].delivered);
}

#[tokio::test]
async fn test_invalid_handoff_publishes_nothing() {
    let f = fabric();
    let source = active_agent(&f.registry, "Backend", &["backend_specialist"]).await;
    let crew_id = f.orchestrator.crew().await.unwrap().id;
    let mut handoffs = f.bus.subscribe(&topics::crew_handoffs(crew_id)).await.unwrap();

    let err = f
        .orchestrator
        .handoff(handoff(source, AgentId::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_handoff");

    // Registered but never heartbeated.
    let idle = f
        .registry
        .register(AgentRegistration {
            name: "Idle".into(),
            endpoint: "http://idle:8000".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let err = f
        .orchestrator
        .handoff(handoff(source, idle.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_handoff");

    assert!(timeout(Duration::from_millis(100), handoffs.next()).await.is_err());
    assert_eq!(f.orchestrator.task("task-login").unwrap_err().kind(), "not_found");
}

#[tokio::test]
async fn test_handoff_to_unknown_crew_is_not_found() {
    let f = fabric();
    let source = active_agent(&f.registry, "Backend", &["backend_specialist"]).await;
    let target = active_agent(&f.registry, "QA", &["qa_engineer"]).await;

    let mut request = handoff(source, target);
    request.crew_id = Some(crewlink_swarm::domain::CrewId::new());
    let err = f.orchestrator.handoff(request).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_plan_records_and_delegates() {
    let f = fabric();
    let qa = active_agent(&f.registry, "QA", &["qa_engineer"]).await;
    let (_conn, mut commands) = f.hub.attach(qa);
    let mut tasks = f.bus.subscribe(topics::CREW_TASKS).await.unwrap();

    let entry = f
        .orchestrator
        .plan("Fix the login bug", json!({"ticket": "LOGIN-7"}))
        .await
        .unwrap();

    assert_eq!(entry.assigned_role.as_deref(), Some("qa_engineer"));
    assert_eq!(entry.status, TaskStatus::Planning);
    assert!(!entry.subtasks.is_empty());

    let stored = f.orchestrator.task(&entry.task_id).unwrap();
    assert_eq!(stored.status, TaskStatus::Delegated);

    let event = timeout(Duration::from_secs(1), tasks.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.message_type, "task_planned");
    assert_eq!(event.correlation_id.as_deref(), Some(entry.task_id.as_str()));

    let frame: Value = serde_json::from_str(&commands.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "plan");
    assert_eq!(frame["payload"]["context"]["ticket"], "LOGIN-7");
}

#[tokio::test]
async fn test_execute_requires_connected_agent() {
    let f = fabric();
    let err = f
        .orchestrator
        .execute("backend_specialist", "Add /login", Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let backend = active_agent(&f.registry, "Backend", &["backend_specialist"]).await;
    let err = f
        .orchestrator
        .execute("backend_specialist", "Add /login", Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport");

    let (_conn, mut commands) = f.hub.attach(backend);
    let receipt = f
        .orchestrator
        .execute("Backend Specialist", "Add /login", Value::Null)
        .await
        .unwrap();
    assert_eq!(receipt.agent_id, backend);
    let frame: Value = serde_json::from_str(&commands.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "task");
    assert_eq!(frame["payload"]["message"], "Add /login");
}

#[tokio::test]
async fn test_http_routes() {
    let f = fabric();
    active_agent(&f.registry, "Strategist", &["project_strategist"]).await;
    let app = crewlink_swarm::presentation::router(f.orchestrator.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/workflow/bugfix")
        .header("content-type", "application/json")
        .body(Body::from(json!({"description": "Login fails"}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["status"], "initiated");
    assert_eq!(body["roles"][0], "project_strategist");
    assert_eq!(body["crew"]["members"].as_array().unwrap().len(), 1);

    let request = Request::builder()
        .method("POST")
        .uri("/workflow/rewrite")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/phase/Deployment?require_ready=true")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["error"]["missing_roles"], json!(["devops_engineer"]));

    let request = Request::builder()
        .method("POST")
        .uri("/phase/launch")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .uri("/phase/deployment/readiness")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["readiness"], "degraded");
    assert_eq!(body["current_phase"], "planning");
    assert_eq!(body["missing_roles"], json!(["devops_engineer"]));

    let request = Request::builder()
        .method("POST")
        .uri("/plan")
        .header("content-type", "application/json")
        .body(Body::from(json!({"task": ["not", "a", "string"]}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["error"]["kind"], "validation");

    let request = Request::builder()
        .method("POST")
        .uri("/phase/testing?force=maybe")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        serde_json::from_slice::<Value>(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap()
            ["error"]["kind"],
        "validation"
    );
}

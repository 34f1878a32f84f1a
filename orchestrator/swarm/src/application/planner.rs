// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task decomposition strategies used by `CrewOrchestrator::plan`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crewlink_core::domain::error::FabricError;
use crewlink_core::domain::llm::{CompletionRequest, LanguageModel};

use crate::domain::crew::Crew;
use crate::domain::task::SubTask;

#[async_trait]
pub trait TaskPlanner: Send + Sync {
    /// Split `task` into role-addressed sub-tasks, in execution order.
    async fn decompose(&self, task: &str, context: &Value, crew: &Crew) -> Result<Vec<SubTask>, FabricError>;
}

/// One sub-task per crew role: seated roles first, then the ones still missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrewFanoutPlanner;

impl CrewFanoutPlanner {
    pub fn fan_out(task: &str, crew: &Crew) -> Vec<SubTask> {
        let mut roles = crew.seated_roles();
        for role in &crew.missing_roles {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }

        roles
            .into_iter()
            .map(|role| SubTask {
                description: format!("{role}: {task}"),
                role,
            })
            .collect()
    }
}

#[async_trait]
impl TaskPlanner for CrewFanoutPlanner {
    async fn decompose(&self, task: &str, _context: &Value, crew: &Crew) -> Result<Vec<SubTask>, FabricError> {
        Ok(Self::fan_out(task, crew))
    }
}

const PLANNER_SYSTEM: &str = "Reply with a JSON array of objects with string fields \"role\" and \"description\". \
No other text.";

/// Asks a language model for the decomposition and falls back to the crew
/// fan-out when the call fails or the reply does not parse.
pub struct LlmTaskPlanner {
    model: Arc<dyn LanguageModel>,
}

impl LlmTaskPlanner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn prompt(task: &str, context: &Value, crew: &Crew) -> String {
        let mut roles = crew.seated_roles();
        roles.extend(crew.missing_roles.iter().cloned());
        format!(
            "Task: {task}\nContext: {context}\nAvailable roles: {}",
            roles.join(", ")
        )
    }
}

/// Extract the outermost JSON array from a model reply.
pub(crate) fn parse_subtasks(text: &str) -> Option<Vec<SubTask>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    let subtasks: Vec<SubTask> = serde_json::from_str(&text[start..=end]).ok()?;
    let subtasks: Vec<SubTask> = subtasks
        .into_iter()
        .filter(|s| !s.role.trim().is_empty())
        .collect();
    (!subtasks.is_empty()).then_some(subtasks)
}

#[async_trait]
impl TaskPlanner for LlmTaskPlanner {
    async fn decompose(&self, task: &str, context: &Value, crew: &Crew) -> Result<Vec<SubTask>, FabricError> {
        let request = CompletionRequest::new(Self::prompt(task, context, crew)).with_system(PLANNER_SYSTEM);

        let completion = match self.model.submit(&request).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, "LLM planning failed, using crew fan-out");
                return Ok(CrewFanoutPlanner::fan_out(task, crew));
            }
        };

        match parse_subtasks(&completion.text) {
            Some(subtasks) => {
                self.model.report_result(&completion, true);
                Ok(subtasks)
            }
            None => {
                self.model.report_result(&completion, false);
                tracing::warn!(
                    provider = completion.provider,
                    "LLM plan was not a sub-task list, using crew fan-out"
                );
                Ok(CrewFanoutPlanner::fan_out(task, crew))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crew::{CrewId, CrewMember, NetworkConfig, Readiness};
    use crate::domain::phase::Phase;
    use chrono::Utc;
    use crewlink_core::domain::agent::AgentId;
    use crewlink_core::domain::llm::{Completion, FinishReason, LlmError, TokenUsage};
    use parking_lot::Mutex;

    fn crew() -> Crew {
        Crew {
            id: CrewId::new(),
            name: "development".into(),
            phase: Phase::Development,
            mission: None,
            members: vec![CrewMember {
                agent_id: AgentId::new(),
                role: "frontend_specialist".into(),
            }],
            missing_roles: vec!["backend_specialist".into()],
            readiness: Readiness::Degraded,
            gatekeeper: Some("qa_engineer".into()),
            network_config: NetworkConfig::default(),
            created_at: Utc::now(),
        }
    }

    struct ScriptedModel {
        reply: Result<String, ()>,
        reports: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn submit(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
            match &self.reply {
                Ok(text) => Ok(Completion {
                    text: text.clone(),
                    usage: TokenUsage::default(),
                    provider: "scripted",
                    model: "test".into(),
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(LlmError::Network("connection refused".into())),
            }
        }

        fn report_result(&self, _completion: &Completion, accepted: bool) {
            self.reports.lock().push(accepted);
        }
    }

    #[tokio::test]
    async fn test_fanout_covers_seated_then_missing_roles() {
        let subtasks = CrewFanoutPlanner
            .decompose("Build login form", &Value::Null, &crew())
            .await
            .unwrap();
        let roles: Vec<_> = subtasks.iter().map(|s| s.role.as_str()).collect();
        assert_eq!(roles, vec!["frontend_specialist", "backend_specialist"]);
        assert_eq!(subtasks[0].description, "frontend_specialist: Build login form");
    }

    #[tokio::test]
    async fn test_llm_planner_uses_model_reply() {
        let model = Arc::new(ScriptedModel {
            reply: Ok(r#"Plan: [{"role": "backend_specialist", "description": "Add /login"}]"#.into()),
            reports: Mutex::new(Vec::new()),
        });
        let planner = LlmTaskPlanner::new(model.clone());

        let subtasks = planner.decompose("Build login", &Value::Null, &crew()).await.unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].description, "Add /login");
        assert_eq!(*model.reports.lock(), vec![true]);
    }

    #[tokio::test]
    async fn test_llm_planner_falls_back() {
        let garbled = Arc::new(ScriptedModel {
            reply: Ok("I would start with the frontend.".into()),
            reports: Mutex::new(Vec::new()),
        });
        let subtasks = LlmTaskPlanner::new(garbled.clone())
            .decompose("Build login", &Value::Null, &crew())
            .await
            .unwrap();
        assert_eq!(subtasks.len(), 2);
        assert_eq!(*garbled.reports.lock(), vec![false]);

        let offline = Arc::new(ScriptedModel {
            reply: Err(()),
            reports: Mutex::new(Vec::new()),
        });
        let subtasks = LlmTaskPlanner::new(offline)
            .decompose("Build login", &Value::Null, &crew())
            .await
            .unwrap();
        assert_eq!(subtasks.len(), 2);
    }

    #[test]
    fn test_parse_rejects_empty_lists() {
        assert!(parse_subtasks("[]").is_none());
        assert!(parse_subtasks("] nothing [").is_none());
    }
}

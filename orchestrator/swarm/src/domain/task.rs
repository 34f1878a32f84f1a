// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Ledger
//!
//! In-memory history of planned tasks and the handoffs made for them.
//! Entries are created by `plan` or by the first handoff that names an
//! unknown task id. The ledger holds at most `limit` entries; the entry
//! updated longest ago is dropped first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crewlink_core::domain::agent::AgentId;

use crate::domain::crew::CrewId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Planning,
    Delegated,
    HandedOff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub role: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub handoff_id: Uuid,
    pub source_agent: AgentId,
    pub target_agent: AgentId,
    pub crew_id: CrewId,
    pub artifacts: Vec<String>,
    pub delivered: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task_id: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub context: Value,
    pub crew_id: Option<CrewId>,
    /// Role the task was routed to for delegation.
    pub assigned_role: Option<String>,
    pub subtasks: Vec<SubTask>,
    pub handoffs: Vec<HandoffRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TaskLedger {
    entries: HashMap<String, TaskEntry>,
    limit: usize,
}

impl Default for TaskLedger {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            limit: limit.max(1),
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        self.evict(None);
    }

    pub fn insert(&mut self, entry: TaskEntry) {
        let task_id = entry.task_id.clone();
        self.entries.insert(task_id.clone(), entry);
        self.evict(Some(&task_id));
    }

    /// Drop the stalest entries until the ledger fits its limit. `keep` is
    /// never dropped.
    fn evict(&mut self, keep: Option<&str>) {
        while self.entries.len() > self.limit {
            let stalest = self
                .entries
                .values()
                .filter(|entry| Some(entry.task_id.as_str()) != keep)
                .min_by(|a, b| (a.updated_at, &a.task_id).cmp(&(b.updated_at, &b.task_id)))
                .map(|entry| entry.task_id.clone());
            match stalest {
                Some(task_id) => {
                    self.entries.remove(&task_id);
                    tracing::debug!(%task_id, "Task evicted from ledger");
                }
                None => break,
            }
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskEntry> {
        self.entries.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a handoff, creating the entry if this task was never planned here.
    pub fn record_handoff(&mut self, task_id: &str, record: HandoffRecord) {
        let now = record.recorded_at;
        let entry = self
            .entries
            .entry(task_id.to_string())
            .or_insert_with(|| TaskEntry {
                task_id: task_id.to_string(),
                description: String::new(),
                status: TaskStatus::HandedOff,
                context: Value::Null,
                crew_id: Some(record.crew_id),
                assigned_role: None,
                subtasks: Vec::new(),
                handoffs: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        entry.status = TaskStatus::HandedOff;
        entry.updated_at = now;
        entry.handoffs.push(record);
        self.evict(Some(task_id));
    }

    pub fn mark_handoff_delivered(&mut self, task_id: &str, handoff_id: Uuid, delivered: bool) {
        if let Some(record) = self
            .entries
            .get_mut(task_id)
            .and_then(|entry| entry.handoffs.iter_mut().find(|h| h.handoff_id == handoff_id))
        {
            record.delivered = delivered;
        }
    }

    pub fn set_status(&mut self, task_id: &str, status: TaskStatus) {
        if let Some(entry) = self.entries.get_mut(task_id) {
            entry.status = status;
            entry.updated_at = Utc::now();
        }
    }
}

/// Pick the role best suited to a task from keywords in its description.
/// Anything unrecognised goes to the project strategist.
pub fn recommend_role(task: &str) -> &'static str {
    let task = task.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| task.contains(w));

    if has(&["test", "bug"]) {
        "qa_engineer"
    } else if has(&["deploy", "docker"]) {
        "devops_engineer"
    } else if has(&["ui", "frontend", "css"]) {
        "frontend_specialist"
    } else if has(&["api", "backend", "python"]) {
        "backend_specialist"
    } else if has(&["db", "schema"]) {
        "database_architect"
    } else if has(&["security", "auth"]) {
        "security_engineer"
    } else if has(&["plan", "strategy"]) {
        "project_strategist"
    } else if has(&["arch", "system"]) {
        "system_architect"
    } else {
        "project_strategist"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handoff(crew_id: CrewId) -> HandoffRecord {
        HandoffRecord {
            handoff_id: Uuid::new_v4(),
            source_agent: AgentId::new(),
            target_agent: AgentId::new(),
            crew_id,
            artifacts: vec!["src/login.rs".into()],
            delivered: false,
            recorded_at: Utc::now(),
        }
    }

    fn entry(task_id: &str, age_secs: i64) -> TaskEntry {
        let at = Utc::now() - chrono::Duration::seconds(age_secs);
        TaskEntry {
            task_id: task_id.into(),
            description: "Fix the login bug".into(),
            status: TaskStatus::Planning,
            context: Value::Null,
            crew_id: None,
            assigned_role: None,
            subtasks: Vec::new(),
            handoffs: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_ledger_drops_stalest_entry_over_limit() {
        let mut ledger = TaskLedger::with_limit(2);
        ledger.insert(entry("task-old", 30));
        ledger.insert(entry("task-mid", 20));
        // A handoff refreshes task-old, so task-mid is now the stalest.
        ledger.record_handoff("task-old", handoff(CrewId::new()));
        ledger.insert(entry("task-new", 10));

        assert_eq!(ledger.len(), 2);
        assert!(ledger.get("task-mid").is_none());
        assert!(ledger.get("task-old").is_some());
        assert!(ledger.get("task-new").is_some());

        // An entry created by a handoff is kept even when it is the newest.
        ledger.record_handoff("task-handoff", handoff(CrewId::new()));
        assert_eq!(ledger.len(), 2);
        assert!(ledger.get("task-handoff").is_some());
    }

    #[test]
    fn test_handoff_creates_missing_entry() {
        let mut ledger = TaskLedger::new();
        let record = handoff(CrewId::new());
        let handoff_id = record.handoff_id;

        ledger.record_handoff("task-1", record);
        ledger.mark_handoff_delivered("task-1", handoff_id, true);

        let entry = ledger.get("task-1").unwrap();
        assert_eq!(entry.status, TaskStatus::HandedOff);
        assert_eq!(entry.handoffs.len(), 1);
        assert!(entry.handoffs[0].delivered);
    }

    #[test]
    fn test_recommend_role_keywords() {
        assert_eq!(recommend_role("Fix the login bug"), "qa_engineer");
        assert_eq!(recommend_role("Style the CSS grid"), "frontend_specialist");
        assert_eq!(recommend_role("Design the DB schema"), "database_architect");
        assert_eq!(recommend_role("Write a poem"), "project_strategist");
    }
}

//! Planned changes and their outcome
//!
//! A [`Plan`] lists one [`Action`] per resource in dependency order. Applying
//! it produces an [`ApplyResult`] that separates finished, failed, pending and
//! skipped actions, so callers can tell a broken deployment from one that is
//! only waiting on validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// `{action}-{type}:{id}`
    pub id: String,
    pub action_type: ActionType,
    /// e.g. "vpc", "database", "dns-record"
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self {
            id: format!("{}-{}:{}", action_type, resource_type, resource_id),
            action_type,
            resource_type,
            resource_id,
            description: description.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// `type:id` of the target resource
    pub fn resource_key(&self) -> String {
        format!("{}:{}", self.resource_type, self.resource_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::NoOp => "no-op",
        })
    }
}

/// Outcome of applying (or destroying) a plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<ActionResult>,
    pub failed: Vec<ActionResult>,
    /// Resource exists but still waits on validation
    pub pending: Vec<ActionResult>,
    /// Never attempted because a dependency failed or is pending
    pub skipped: Vec<SkippedAction>,
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Nothing failed, nothing is pending and nothing was skipped
    pub fn is_complete(&self) -> bool {
        self.is_success() && self.pending.is_empty() && self.skipped.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult::new(action_id, message));
    }

    pub fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionResult {
            error: Some(error),
            ..ActionResult::new(action_id, String::new())
        });
    }

    pub fn add_pending(&mut self, action_id: String, message: String) {
        self.pending.push(ActionResult::new(action_id, message));
    }

    pub fn add_skipped(&mut self, action_id: String, blocked_by: String) {
        self.skipped.push(SkippedAction {
            action_id,
            blocked_by,
        });
    }

    pub fn first_failure(&self) -> Option<&ActionResult> {
        self.failed.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub message: String,
    pub error: Option<String>,
}

impl ActionResult {
    fn new(action_id: String, message: String) -> Self {
        Self {
            action_id,
            message,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedAction {
    pub action_id: String,
    /// Key of the resource that failed or is still pending
    pub blocked_by: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// In dependency order
    pub actions: Vec<Action>,
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn action_for(&self, key: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.resource_key() == key)
    }

    pub fn summary(&self) -> PlanSummary {
        self.actions
            .iter()
            .fold(PlanSummary::default(), |mut summary, action| {
                match action.action_type {
                    ActionType::Create => summary.create += 1,
                    ActionType::Update => summary.update += 1,
                    ActionType::Delete => summary.delete += 1,
                    ActionType::NoOp => summary.no_change += 1,
                }
                summary
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

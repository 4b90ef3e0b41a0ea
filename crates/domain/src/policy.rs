use serde::{Deserialize, Serialize};

use crate::tool::ApprovalMode;

/// The scope a `PolicyRule` applies to. Precedence when evaluating a call is
/// `actor+client > actor > client > workspace` (§4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum PolicyScope {
    ActorClient { actor_id: String, client_id: String },
    Actor { actor_id: String },
    Client { client_id: String },
    Workspace,
}

impl PolicyScope {
    /// Precedence tier — lower sorts first (wins).
    pub fn tier(&self) -> u8 {
        match self {
            PolicyScope::ActorClient { .. } => 0,
            PolicyScope::Actor { .. } => 1,
            PolicyScope::Client { .. } => 2,
            PolicyScope::Workspace => 3,
        }
    }
}

/// A single rule the policy evaluator (component B) matches against a
/// pending tool call. Rules are grouped by precedence tier; within a tier
/// the highest `priority` wins, ties broken by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub workspace_id: String,
    pub scope: PolicyScope,
    /// Exact tool path or glob (`*` matches one segment, `**` matches any
    /// suffix).
    pub tool_path_pattern: String,
    pub effect: PolicyEffect,
    #[serde(default)]
    pub arg_conditions: Vec<ArgCondition>,
    #[serde(default)]
    pub priority: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    Allow,
    RequireApproval,
    Deny,
}

impl From<PolicyEffect> for ApprovalMode {
    fn from(effect: PolicyEffect) -> Self {
        match effect {
            PolicyEffect::Allow => ApprovalMode::Allow,
            PolicyEffect::RequireApproval => ApprovalMode::RequireApproval,
            PolicyEffect::Deny => ApprovalMode::Deny,
        }
    }
}

/// A condition matched against a single top-level argument of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgCondition {
    /// Dot-separated JSON path into the call's input object.
    pub path: String,
    pub op: ArgOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgOp {
    Equals,
    Contains,
    StartsWith,
    NotEquals,
}

/// Outcome of evaluating the rule set plus descriptor default plus system
/// default against a single tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub effect: ApprovalMode,
    pub matched_rule_id: Option<String>,
}

impl PolicyDecision {
    pub fn system_default(effect: ApprovalMode) -> Self {
        Self {
            effect,
            matched_rule_id: None,
        }
    }

    pub fn from_rule(rule: &PolicyRule) -> Self {
        Self {
            effect: rule.effect.into(),
            matched_rule_id: Some(rule.id.clone()),
        }
    }

    pub fn fail_closed() -> Self {
        Self {
            effect: ApprovalMode::Deny,
            matched_rule_id: None,
        }
    }
}

use serde::{Deserialize, Serialize};

/// Identity attached to a Run or an approval decision (§3).
///
/// Carried end-to-end so the policy engine, the audit trail, and approval
/// attribution all agree on who is responsible for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    User { id: String },
    Service { id: String },
    Anonymous,
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::User { id } | Actor::Service { id } => id,
            Actor::Anonymous => "anonymous",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Actor::User { .. } => "user",
            Actor::Service { .. } => "service",
            Actor::Anonymous => "anonymous",
        }
    }
}

/// Everything a Run carries about who/what is driving it and where it runs.
///
/// Threaded explicitly as a parameter into B, C, D, E, F, G — never read
/// from ambient/global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub actor: Actor,
    pub workspace_id: String,
    /// The tenant-level grouping a workspace belongs to, when the
    /// deployment has one. Used only by credential resolution's
    /// actor → organization → workspace fallback (§4.C); absent for
    /// deployments with no organization layer above a workspace.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Identifies the calling client (CLI, MCP peer, dashboard session)
    /// independently of the actor, for policy rules scoped to a client.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

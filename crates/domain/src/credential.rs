use serde::{Deserialize, Serialize};

/// How a resolved credential is attached to an outgoing request (§4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthProfile {
    Bearer,
    ApiKey { header: String },
    Basic,
    None,
}

/// The scope a stored credential applies to — resolution falls back
/// actor → organization → workspace (§3/§4.C). `Global` is an extra tier
/// below `Workspace`, beyond what §3 names, for a credential shared across
/// every tenant (documented as a decision in DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum CredentialScope {
    Actor { actor_id: String },
    Organization { organization_id: String },
    Workspace { workspace_id: String },
    Global,
}

impl CredentialScope {
    /// Scopes to probe in resolution order, most specific first. The
    /// `Organization` tier is skipped when the caller's context carries no
    /// `organization_id`.
    pub fn fallback_chain(
        workspace_id: &str,
        organization_id: Option<&str>,
        actor_id: &str,
    ) -> Vec<CredentialScope> {
        let mut chain = vec![CredentialScope::Actor {
            actor_id: actor_id.into(),
        }];
        if let Some(organization_id) = organization_id {
            chain.push(CredentialScope::Organization {
                organization_id: organization_id.into(),
            });
        }
        chain.push(CredentialScope::Workspace {
            workspace_id: workspace_id.into(),
        });
        chain.push(CredentialScope::Global);
        chain
    }
}

/// A credential stored behind the `SecretVault` port, keyed by scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: String,
    pub scope: CredentialScope,
    pub profile: AuthProfile,
    /// Opaque reference into the vault (e.g. a keyring entry name); never
    /// the secret value itself.
    pub secret_ref: String,
}

/// The header(s) a resolved credential should be attached as, after the
/// vault lookup and `AuthProfile` have been combined.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub header_name: String,
    pub header_value: String,
}

//! Credential resolver (component C, SPEC_FULL §4.C).
//!
//! Produces the header map for a tool call by resolving `(sourceKey, scope)`
//! with fallback order actor → organization → workspace, through a
//! `SecretVault` port. The vault itself is explicitly out of scope; this
//! crate owns the fallback lookup, header-shaping, and the read-through
//! cache in front of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use cg_domain::{
    AuthProfile, CredentialRecord, CredentialScope, Error, ResolvedCredential, Result,
};
use parking_lot::RwLock;

/// Port over wherever secret material actually lives (env, keyring, a
/// managed secrets service). Out of scope per §1; this crate only depends
/// on the trait.
#[async_trait::async_trait]
pub trait SecretVault: Send + Sync {
    /// Look up the raw secret material for a stored `CredentialRecord` by
    /// its opaque `secret_ref`. Returns `None` if the record names a
    /// reference the vault doesn't (or no longer) has.
    async fn read_secret(&self, secret_ref: &str) -> anyhow::Result<Option<String>>;

    /// Find the most applicable `CredentialRecord` for a source at a given
    /// scope level, if one is stored.
    async fn find_record(
        &self,
        source_id: &str,
        scope: &CredentialScope,
    ) -> anyhow::Result<Option<CredentialRecord>>;
}

struct CacheEntry {
    resolved: ResolvedCredential,
    expires_at: Instant,
}

pub struct CredentialResolver {
    vault: Arc<dyn SecretVault>,
    default_api_key_header: String,
    cache_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl CredentialResolver {
    pub fn new(
        vault: Arc<dyn SecretVault>,
        default_api_key_header: String,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            vault,
            default_api_key_header,
            cache_ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(source_id: &str, scope: &CredentialScope) -> String {
        format!("{source_id}:{scope:?}")
    }

    /// Invalidate every cached entry for a source (upsert/delete of any of
    /// its credentials). Never invalidated purely on a timer.
    pub fn invalidate_source(&self, source_id: &str) {
        self.cache
            .write()
            .retain(|key, _| !key.starts_with(&format!("{source_id}:")));
    }

    pub async fn resolve(
        &self,
        source_id: &str,
        workspace_id: &str,
        organization_id: Option<&str>,
        actor_id: &str,
    ) -> Result<ResolvedCredential> {
        for scope in CredentialScope::fallback_chain(workspace_id, organization_id, actor_id) {
            let key = Self::cache_key(source_id, &scope);
            if let Some(hit) = self.cache_get(&key) {
                return Ok(hit);
            }

            let record = self
                .vault
                .find_record(source_id, &scope)
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;

            let Some(record) = record else { continue };

            let secret = self
                .vault
                .read_secret(&record.secret_ref)
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;

            let Some(secret) = secret else { continue };

            let resolved = self.shape_header(&record.profile, &secret)?;
            self.cache.write().insert(
                key,
                CacheEntry {
                    resolved: resolved.clone(),
                    expires_at: Instant::now() + self.cache_ttl,
                },
            );
            return Ok(resolved);
        }

        Err(Error::AuthMissing(format!(
            "no credential found for source \"{source_id}\""
        )))
    }

    fn cache_get(&self, key: &str) -> Option<ResolvedCredential> {
        let guard = self.cache.read();
        let entry = guard.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.resolved.clone())
        } else {
            None
        }
    }

    fn shape_header(&self, profile: &AuthProfile, secret: &str) -> Result<ResolvedCredential> {
        match profile {
            AuthProfile::Bearer => Ok(ResolvedCredential {
                header_name: "authorization".into(),
                header_value: format!("Bearer {secret}"),
            }),
            AuthProfile::ApiKey { header } => {
                let header_name = if header.is_empty() {
                    self.default_api_key_header.clone()
                } else {
                    header.clone()
                };
                Ok(ResolvedCredential {
                    header_name,
                    header_value: secret.to_string(),
                })
            }
            AuthProfile::Basic => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(secret);
                Ok(ResolvedCredential {
                    header_name: "authorization".into(),
                    header_value: format!("Basic {encoded}"),
                })
            }
            AuthProfile::None => Ok(ResolvedCredential {
                header_name: String::new(),
                header_value: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeVault {
        records: Mutex<HashMap<String, CredentialRecord>>,
        secrets: Mutex<HashMap<String, String>>,
    }

    #[async_trait::async_trait]
    impl SecretVault for FakeVault {
        async fn read_secret(&self, secret_ref: &str) -> anyhow::Result<Option<String>> {
            Ok(self.secrets.lock().unwrap().get(secret_ref).cloned())
        }

        async fn find_record(
            &self,
            source_id: &str,
            scope: &CredentialScope,
        ) -> anyhow::Result<Option<CredentialRecord>> {
            let key = format!("{source_id}:{scope:?}");
            Ok(self.records.lock().unwrap().get(&key).cloned())
        }
    }

    fn vault_with_actor_bearer() -> FakeVault {
        let scope = CredentialScope::Actor {
            actor_id: "u1".into(),
        };
        let key = format!("github:{scope:?}");
        let mut records = HashMap::new();
        records.insert(
            key,
            CredentialRecord {
                id: "cred-1".into(),
                scope,
                profile: AuthProfile::Bearer,
                secret_ref: "ref-1".into(),
            },
        );
        let mut secrets = HashMap::new();
        secrets.insert("ref-1".into(), "tok-123".into());
        FakeVault {
            records: Mutex::new(records),
            secrets: Mutex::new(secrets),
        }
    }

    #[tokio::test]
    async fn resolves_bearer_from_actor_scope() {
        let resolver = CredentialResolver::new(
            Arc::new(vault_with_actor_bearer()),
            "x-api-key".into(),
            Duration::from_secs(60),
        );
        let resolved = resolver.resolve("github", "ws1", None, "u1").await.unwrap();
        assert_eq!(resolved.header_name, "authorization");
        assert_eq!(resolved.header_value, "Bearer tok-123");
    }

    #[tokio::test]
    async fn missing_credential_is_auth_missing() {
        let vault = FakeVault {
            records: Mutex::new(HashMap::new()),
            secrets: Mutex::new(HashMap::new()),
        };
        let resolver =
            CredentialResolver::new(Arc::new(vault), "x-api-key".into(), Duration::from_secs(60));
        let err = resolver.resolve("github", "ws1", None, "u1").await.unwrap_err();
        assert_eq!(err.kind(), "auth_missing");
    }

    #[tokio::test]
    async fn cache_hit_avoids_second_vault_read() {
        let resolver = CredentialResolver::new(
            Arc::new(vault_with_actor_bearer()),
            "x-api-key".into(),
            Duration::from_secs(60),
        );
        let first = resolver.resolve("github", "ws1", None, "u1").await.unwrap();
        let second = resolver.resolve("github", "ws1", None, "u1").await.unwrap();
        assert_eq!(first.header_value, second.header_value);
    }

    #[tokio::test]
    async fn falls_back_to_organization_before_workspace() {
        let scope = CredentialScope::Organization {
            organization_id: "org-1".into(),
        };
        let key = format!("github:{scope:?}");
        let mut records = HashMap::new();
        records.insert(
            key,
            CredentialRecord {
                id: "cred-org".into(),
                scope,
                profile: AuthProfile::ApiKey { header: String::new() },
                secret_ref: "ref-org".into(),
            },
        );
        let workspace_scope = CredentialScope::Workspace {
            workspace_id: "ws1".into(),
        };
        records.insert(
            format!("github:{workspace_scope:?}"),
            CredentialRecord {
                id: "cred-ws".into(),
                scope: workspace_scope,
                profile: AuthProfile::ApiKey { header: String::new() },
                secret_ref: "ref-ws".into(),
            },
        );
        let mut secrets = HashMap::new();
        secrets.insert("ref-org".into(), "org-secret".into());
        secrets.insert("ref-ws".into(), "ws-secret".into());
        let vault = FakeVault {
            records: Mutex::new(records),
            secrets: Mutex::new(secrets),
        };
        let resolver =
            CredentialResolver::new(Arc::new(vault), "x-api-key".into(), Duration::from_secs(60));

        // No actor-scoped credential, so resolution falls to the
        // organization tier and must not skip ahead to workspace.
        let resolved = resolver
            .resolve("github", "ws1", Some("org-1"), "u1")
            .await
            .unwrap();
        assert_eq!(resolved.header_value, "org-secret");
    }
}

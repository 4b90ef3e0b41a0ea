//! Concrete `SecretVault` (component C's external port, §6.5's
//! `credentials` collection).
//!
//! Two halves, same split every credential manager in this shape uses:
//! metadata (which scope maps to which `secret_ref`, under which auth
//! profile) lives in an append-only `credentials.jsonl` index, same shape
//! as [`crate::store::source_store::SourceStore`]. The secret value itself
//! never touches disk here — it lives in the OS keychain via `keyring`,
//! the same store `cli::credential` reads and writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cg_credentials::SecretVault;
use cg_domain::{CredentialRecord, CredentialScope};
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

const SERVICE: &str = "codegate";

fn record_key(source_id: &str, scope: &CredentialScope) -> String {
    format!("{source_id}:{scope:?}")
}

pub struct KeyringCredentialStore {
    data_dir: PathBuf,
    index: RwLock<HashMap<String, CredentialRecord>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl KeyringCredentialStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut index = HashMap::new();
        for line in read_lines(&data_dir.join("credentials.jsonl")).await? {
            let record: CredentialRecordEntry = serde_json::from_str(&line)?;
            match record {
                CredentialRecordEntry::Upsert { key, record } => {
                    index.insert(key, record);
                }
                CredentialRecordEntry::Delete { key } => {
                    index.remove(&key);
                }
            }
        }

        Ok(Self {
            data_dir,
            index: RwLock::new(index),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append(&self, entry: &CredentialRecordEntry) -> anyhow::Result<()> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join("credentials.jsonl"))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Store a credential's metadata and the secret value itself (OS
    /// keychain, keyed by `secret_ref`). `source_id`+`scope` together
    /// identify the record for later `find_record` lookups.
    pub async fn put(
        &self,
        source_id: &str,
        record: CredentialRecord,
        secret_value: &str,
    ) -> anyhow::Result<()> {
        let entry = keyring::Entry::new(SERVICE, &record.secret_ref)?;
        entry.set_password(secret_value)?;

        let key = record_key(source_id, &record.scope);
        self.append(&CredentialRecordEntry::Upsert {
            key: key.clone(),
            record: record.clone(),
        })
        .await?;
        self.index.write().insert(key, record);
        Ok(())
    }

    pub async fn remove(&self, source_id: &str, scope: &CredentialScope) -> anyhow::Result<bool> {
        let key = record_key(source_id, scope);
        let existing = self.index.read().get(&key).cloned();
        let Some(existing) = existing else {
            return Ok(false);
        };

        self.append(&CredentialRecordEntry::Delete { key: key.clone() })
            .await?;
        self.index.write().remove(&key);

        if let Ok(entry) = keyring::Entry::new(SERVICE, &existing.secret_ref) {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => tracing::warn!(error = %e, "failed to delete secret from keychain"),
            }
        }
        Ok(true)
    }

    pub fn list_for_source(&self, source_id: &str) -> Vec<CredentialRecord> {
        let prefix = format!("{source_id}:");
        self.index
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op")]
enum CredentialRecordEntry {
    #[serde(rename = "upsert")]
    Upsert { key: String, record: CredentialRecord },
    #[serde(rename = "delete")]
    Delete { key: String },
}

async fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl SecretVault for KeyringCredentialStore {
    async fn read_secret(&self, secret_ref: &str) -> anyhow::Result<Option<String>> {
        let entry = keyring::Entry::new(SERVICE, secret_ref)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_record(
        &self,
        source_id: &str,
        scope: &CredentialScope,
    ) -> anyhow::Result<Option<CredentialRecord>> {
        Ok(self.index.read().get(&record_key(source_id, scope)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::AuthProfile;

    fn record(secret_ref: &str, scope: CredentialScope) -> CredentialRecord {
        CredentialRecord {
            id: uuid::Uuid::new_v4().to_string(),
            scope,
            profile: AuthProfile::Bearer,
            secret_ref: secret_ref.into(),
        }
    }

    // Exercises only the metadata index — `put`/`remove` touch the real OS
    // keychain, which is not available in this sandbox's test runner.
    #[tokio::test]
    async fn find_record_is_none_before_any_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyringCredentialStore::open(dir.path()).await.unwrap();
        let found = store
            .find_record("src-1", &CredentialScope::Global)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn metadata_index_replays_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let key = record_key("src-1", &CredentialScope::Global);
        let rec = record("ref-1", CredentialScope::Global);
        {
            let store = KeyringCredentialStore::open(dir.path()).await.unwrap();
            store
                .append(&CredentialRecordEntry::Upsert {
                    key: key.clone(),
                    record: rec.clone(),
                })
                .await
                .unwrap();
        }
        let reopened = KeyringCredentialStore::open(dir.path()).await.unwrap();
        let found = reopened
            .find_record("src-1", &CredentialScope::Global)
            .await
            .unwrap();
        assert_eq!(found.unwrap().secret_ref, "ref-1");
    }
}

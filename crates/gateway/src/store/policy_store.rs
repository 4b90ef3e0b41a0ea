//! Concrete `PolicyStore` (component B's read port, §6.5's `policies`
//! collection). `cg-policy` only defines the trait `PolicyEvaluator` reads
//! through — persisting rules is the composition root's job, same
//! append-only-log shape as [`crate::store::source_store::SourceStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cg_domain::PolicyRule;
use cg_policy::PolicyStore;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

pub struct JsonlPolicyStore {
    data_dir: PathBuf,
    index: RwLock<HashMap<String, PolicyRule>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlPolicyStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut index = HashMap::new();
        for line in read_lines(&data_dir.join("policies.jsonl")).await? {
            let record: PolicyRecord = serde_json::from_str(&line)?;
            match record {
                PolicyRecord::Upsert(rule) => {
                    index.insert(rule.id.clone(), rule);
                }
                PolicyRecord::Delete(id) => {
                    index.remove(&id);
                }
            }
        }

        Ok(Self {
            data_dir,
            index: RwLock::new(index),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append(&self, record: &PolicyRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join("policies.jsonl"))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn upsert(&self, rule: PolicyRule) -> anyhow::Result<()> {
        self.append(&PolicyRecord::Upsert(rule.clone())).await?;
        self.index.write().insert(rule.id.clone(), rule);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let existed = self.index.read().contains_key(id);
        if existed {
            self.append(&PolicyRecord::Delete(id.to_string())).await?;
            self.index.write().remove(id);
        }
        Ok(existed)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op")]
enum PolicyRecord {
    #[serde(rename = "upsert")]
    Upsert(PolicyRule),
    #[serde(rename = "delete")]
    Delete(String),
}

async fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl PolicyStore for JsonlPolicyStore {
    async fn rules_for_workspace(&self, workspace_id: &str) -> anyhow::Result<Vec<PolicyRule>> {
        Ok(self
            .index
            .read()
            .values()
            .filter(|r| r.workspace_id == workspace_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::{PolicyEffect, PolicyScope};

    fn rule(id: &str, workspace_id: &str) -> PolicyRule {
        PolicyRule {
            id: id.into(),
            workspace_id: workspace_id.into(),
            scope: PolicyScope::Workspace,
            tool_path_pattern: "*".into(),
            effect: PolicyEffect::Allow,
            arg_conditions: vec![],
            priority: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn rules_for_workspace_filters_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlPolicyStore::open(dir.path()).await.unwrap();
            store.upsert(rule("r1", "ws1")).await.unwrap();
            store.upsert(rule("r2", "ws2")).await.unwrap();
        }

        let reopened = JsonlPolicyStore::open(dir.path()).await.unwrap();
        let found = reopened.rules_for_workspace("ws1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r1");
    }

    #[tokio::test]
    async fn remove_drops_rule() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPolicyStore::open(dir.path()).await.unwrap();
        store.upsert(rule("r1", "ws1")).await.unwrap();
        store.remove("r1").await.unwrap();
        assert!(store.rules_for_workspace("ws1").await.unwrap().is_empty());
    }
}

//! `Source` persistence (§6.5's `tool_sources` collection).
//!
//! No other crate owns this — `cg-registry` takes a `&[Source]` slice at
//! `rebuild` time and `cg-providers` takes one at `from_sources` time, but
//! neither persists it. Follows the same append-only-log-plus-index shape
//! as `cg_lifecycle::store::JsonlStateStore`: one `sources.jsonl` line per
//! write, replayed into an in-memory index on `open`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cg_domain::Source;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

pub struct SourceStore {
    data_dir: PathBuf,
    index: RwLock<HashMap<String, Source>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl SourceStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut index = HashMap::new();
        for line in read_lines(&data_dir.join("sources.jsonl")).await? {
            let record: SourceRecord = serde_json::from_str(&line)?;
            match record {
                SourceRecord::Upsert(source) => {
                    index.insert(source.id.clone(), source);
                }
                SourceRecord::Delete(id) => {
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

    async fn append(&self, record: &SourceRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join("sources.jsonl"))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn upsert(&self, source: Source) -> anyhow::Result<()> {
        self.append(&SourceRecord::Upsert(source.clone())).await?;
        self.index.write().insert(source.id.clone(), source);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> anyhow::Result<bool> {
        let existed = self.index.read().contains_key(id);
        if existed {
            self.append(&SourceRecord::Delete(id.to_string())).await?;
            self.index.write().remove(id);
        }
        Ok(existed)
    }

    pub fn get(&self, id: &str) -> Option<Source> {
        self.index.read().get(id).cloned()
    }

    pub fn list_all(&self) -> Vec<Source> {
        self.index.read().values().cloned().collect()
    }

    pub fn list_for_workspace(&self, workspace_id: &str) -> Vec<Source> {
        self.index
            .read()
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op")]
enum SourceRecord {
    #[serde(rename = "upsert")]
    Upsert(Source),
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

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::SourceKind;

    fn source(id: &str, workspace_id: &str) -> Source {
        Source {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: id.into(),
            kind: SourceKind::Http,
            endpoint: Some("https://example.com".into()),
            config: serde_json::Value::Null,
            enabled: true,
            source_hash: "h".into(),
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SourceStore::open(dir.path()).await.unwrap();
            store.upsert(source("s1", "ws1")).await.unwrap();
        }
        let reopened = SourceStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.list_all().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_from_index_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let store = SourceStore::open(dir.path()).await.unwrap();
        store.upsert(source("s1", "ws1")).await.unwrap();
        store.remove("s1").await.unwrap();
        assert!(store.get("s1").is_none());

        let reopened = SourceStore::open(dir.path()).await.unwrap();
        assert!(reopened.get("s1").is_none());
    }

    #[tokio::test]
    async fn list_for_workspace_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = SourceStore::open(dir.path()).await.unwrap();
        store.upsert(source("s1", "ws1")).await.unwrap();
        store.upsert(source("s2", "ws2")).await.unwrap();
        assert_eq!(store.list_for_workspace("ws1").len(), 1);
    }
}

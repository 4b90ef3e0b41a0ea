//! `StateStore` port (§6.5) plus the two implementations this family of
//! services ships: an in-memory store for tests, and an append-only JSONL
//! store for single-node deployments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cg_domain::{Run, RunEvent};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

/// Narrow persistence port every durable collection in this system is
/// written through. Construct/load/save/list, async, fallible — not a
/// specific database. A networked backend is a new impl of this trait,
/// not a change to any component that depends on it.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn save_run(&self, run: &Run) -> anyhow::Result<()>;
    async fn load_run(&self, run_id: &str) -> anyhow::Result<Option<Run>>;
    async fn list_runs(&self, workspace_id: &str) -> anyhow::Result<Vec<Run>>;
    async fn append_event(&self, event: &RunEvent) -> anyhow::Result<()>;
    async fn load_events(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>>;
}

/// In-process, non-durable `StateStore` used by tests and by `doctor`-style
/// dry runs. Never persists across a restart.
#[derive(Default)]
pub struct InMemoryStateStore {
    runs: Mutex<HashMap<String, Run>>,
    events: Mutex<HashMap<String, Vec<RunEvent>>>,
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_run(&self, run: &Run) -> anyhow::Result<()> {
        self.runs.lock().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> anyhow::Result<Option<Run>> {
        Ok(self.runs.lock().get(run_id).cloned())
    }

    async fn list_runs(&self, workspace_id: &str) -> anyhow::Result<Vec<Run>> {
        Ok(self
            .runs
            .lock()
            .values()
            .filter(|r| r.context.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn append_event(&self, event: &RunEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .entry(event.run_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load_events(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
        Ok(self.events.lock().get(run_id).cloned().unwrap_or_default())
    }
}

/// Append-only JSONL `StateStore`: one `runs.jsonl` and one `events.jsonl`
/// under `data_dir`, each record a single JSON line. A bounded in-memory
/// index (guarded by the same mutex as the file handle) serves reads
/// without re-scanning the log; `save_run` appends a new line rather than
/// rewriting history, so `load_run` returns the most recently appended
/// record for that id.
pub struct JsonlStateStore {
    data_dir: PathBuf,
    runs: Mutex<HashMap<String, Run>>,
    events: Mutex<HashMap<String, Vec<RunEvent>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlStateStore {
    /// Open (creating if absent) the JSONL store rooted at `data_dir`,
    /// replaying both logs into the in-memory index.
    pub async fn open(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut runs = HashMap::new();
        for line in read_lines(&data_dir.join("runs.jsonl")).await? {
            let run: Run = serde_json::from_str(&line)?;
            runs.insert(run.id.clone(), run);
        }

        let mut events: HashMap<String, Vec<RunEvent>> = HashMap::new();
        for line in read_lines(&data_dir.join("events.jsonl")).await? {
            let event: RunEvent = serde_json::from_str(&line)?;
            events.entry(event.run_id.clone()).or_default().push(event);
        }

        Ok(Self {
            data_dir,
            runs: Mutex::new(runs),
            events: Mutex::new(events),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append_line(&self, file_name: &str, line: String) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join(file_name))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

async fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl StateStore for JsonlStateStore {
    async fn save_run(&self, run: &Run) -> anyhow::Result<()> {
        let line = serde_json::to_string(run)?;
        self.append_line("runs.jsonl", line).await?;
        self.runs.lock().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> anyhow::Result<Option<Run>> {
        Ok(self.runs.lock().get(run_id).cloned())
    }

    async fn list_runs(&self, workspace_id: &str) -> anyhow::Result<Vec<Run>> {
        Ok(self
            .runs
            .lock()
            .values()
            .filter(|r| r.context.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn append_event(&self, event: &RunEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(event)?;
        self.append_line("events.jsonl", line).await?;
        self.events
            .lock()
            .entry(event.run_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load_events(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
        Ok(self.events.lock().get(run_id).cloned().unwrap_or_default())
    }
}

/// Convenience constructor selecting a backing `StateStore` from config at
/// startup (§10.3 — components are handed their dependencies, not left to
/// read environment/config themselves).
pub async fn open_configured(data_dir: impl AsRef<Path>) -> anyhow::Result<Arc<dyn StateStore>> {
    Ok(Arc::new(JsonlStateStore::open(data_dir).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::{Actor, ExecutionContext, RunEventKind, RunStatus, RuntimeKind};

    fn run(id: &str) -> Run {
        Run {
            id: id.into(),
            context: ExecutionContext {
                actor: Actor::User { id: "u1".into() },
                workspace_id: "ws1".into(),
                organization_id: None,
                client_id: None,
                tags: vec![],
            },
            runtime_kind: RuntimeKind::LocalInproc,
            code: "1".into(),
            timeout_ms: 1000,
            status: RunStatus::Queued,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            terminal_payload: None,
            code_run_count: 0,
            event_seq: 0,
        }
    }

    #[tokio::test]
    async fn in_memory_round_trips_a_run() {
        let store = InMemoryStateStore::default();
        store.save_run(&run("r1")).await.unwrap();
        let loaded = store.load_run("r1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "r1");
    }

    #[tokio::test]
    async fn jsonl_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlStateStore::open(dir.path()).await.unwrap();
            store.save_run(&run("r1")).await.unwrap();
            store
                .append_event(&RunEvent {
                    run_id: "r1".into(),
                    seq: 1,
                    kind: RunEventKind::TimedOut,
                })
                .await
                .unwrap();
        }

        let reopened = JsonlStateStore::open(dir.path()).await.unwrap();
        assert!(reopened.load_run("r1").await.unwrap().is_some());
        assert_eq!(reopened.load_events("r1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn jsonl_store_keeps_latest_save_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStateStore::open(dir.path()).await.unwrap();
        let mut r = run("r1");
        store.save_run(&r).await.unwrap();
        r.status = RunStatus::Running;
        store.save_run(&r).await.unwrap();

        let reopened = JsonlStateStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.load_run("r1").await.unwrap().unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn list_runs_filters_by_workspace() {
        let store = InMemoryStateStore::default();
        store.save_run(&run("r1")).await.unwrap();
        let mut other = run("r2");
        other.context.workspace_id = "ws2".into();
        store.save_run(&other).await.unwrap();

        let found = store.list_runs("ws1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r1");
    }
}

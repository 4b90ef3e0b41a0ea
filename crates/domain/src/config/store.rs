use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateStore (persistence port, §6.5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory the file-backed `StateStore` implementation writes its
    /// append-only JSONL collections under.
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    /// How long (milliseconds) a terminal Run's in-memory session is
    /// retained after its terminal event has been drained, before H may
    /// reclaim it (§4.H).
    #[serde(default = "d_run_session_retention_ms")]
    pub run_session_retention_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            run_session_retention_ms: d_run_session_retention_ms(),
        }
    }
}

fn d_data_dir() -> String {
    "./data".into()
}
fn d_run_session_retention_ms() -> u64 {
    120_000
}

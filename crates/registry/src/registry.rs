//! `WorkspaceToolBuilder` (compiles snapshots) and `WorkspaceRegistry`
//! (holds and atomically publishes them, component I's read path for the
//! control plane and for F/G's per-run snapshot pin).

use std::collections::HashMap;
use std::sync::Arc;

use cg_domain::{Source, SourceKind, ToolDescriptor, ToolRegistrySnapshot};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::expander::SourceExpander;

/// Result of comparing a freshly built snapshot against the one it replaces.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub added: Vec<ToolDescriptor>,
    pub changed: Vec<ToolDescriptor>,
    pub removed: Vec<ToolDescriptor>,
}

impl SnapshotDiff {
    fn compute(previous: &ToolRegistrySnapshot, next: &ToolRegistrySnapshot) -> Self {
        let prev_by_id: HashMap<&str, &ToolDescriptor> =
            previous.tools.iter().map(|t| (t.id.as_str(), t)).collect();
        let next_by_id: HashMap<&str, &ToolDescriptor> =
            next.tools.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut diff = SnapshotDiff::default();
        for tool in &next.tools {
            match prev_by_id.get(tool.id.as_str()) {
                None => diff.added.push(tool.clone()),
                Some(prev_tool) => {
                    if descriptor_fingerprint(prev_tool) != descriptor_fingerprint(tool) {
                        diff.changed.push(tool.clone());
                    }
                }
            }
        }
        for tool in &previous.tools {
            if !next_by_id.contains_key(tool.id.as_str()) {
                diff.removed.push(tool.clone());
            }
        }
        diff
    }
}

fn descriptor_fingerprint(t: &ToolDescriptor) -> String {
    serde_json::to_string(t).unwrap_or_default()
}

/// Compiles `ToolDescriptor`s out of a workspace's enabled sources.
///
/// Holds one expander per `SourceKind` (injected by the composition root —
/// this crate has no transport dependencies of its own) and an artifact
/// cache keyed by `source_id`, so a `rebuild` that only touches one source
/// doesn't re-expand the rest.
pub struct WorkspaceToolBuilder {
    expanders: HashMap<SourceKind, Arc<dyn SourceExpander>>,
    cache: parking_lot::Mutex<HashMap<String, (String, Vec<ToolDescriptor>)>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no expander registered for source kind {0:?}")]
    NoExpander(SourceKind),
    #[error("tool path collision on {path:?} between sources {first:?} and {second:?}")]
    PathCollision {
        path: String,
        first: String,
        second: String,
    },
    #[error("failed to expand source {source_id}: {source}")]
    Expand {
        source_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl WorkspaceToolBuilder {
    pub fn new(expanders: HashMap<SourceKind, Arc<dyn SourceExpander>>) -> Self {
        Self {
            expanders,
            cache: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Builds a fresh snapshot from `sources` (only `enabled` ones
    /// contribute), reusing the artifact cache for any source whose
    /// `source_hash` matches the last successful expansion.
    pub async fn build(&self, sources: &[Source]) -> Result<ToolRegistrySnapshot, BuildError> {
        let mut all = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for source in sources.iter().filter(|s| s.enabled) {
            let cached = self.cache.lock().get(&source.id).cloned();
            let descriptors = match cached {
                Some((hash, descriptors)) if hash == source.source_hash => descriptors,
                _ => {
                    let expander = self
                        .expanders
                        .get(&source.kind)
                        .ok_or(BuildError::NoExpander(source.kind))?;
                    let descriptors =
                        expander
                            .expand(source)
                            .await
                            .map_err(|e| BuildError::Expand {
                                source_id: source.id.clone(),
                                source: e,
                            })?;
                    self.cache
                        .lock()
                        .insert(source.id.clone(), (source.source_hash.clone(), descriptors.clone()));
                    descriptors
                }
            };

            for descriptor in descriptors {
                if let Some(existing_source) = owners.insert(descriptor.name.clone(), source.id.clone()) {
                    if existing_source != source.id {
                        return Err(BuildError::PathCollision {
                            path: descriptor.name,
                            first: existing_source,
                            second: source.id.clone(),
                        });
                    }
                }
                all.push(descriptor);
            }
        }

        all.sort_by(|a, b| a.name.cmp(&b.name));
        let version = version_hash(&all);
        Ok(ToolRegistrySnapshot { version, tools: all })
    }

    /// Drops the cached expansion for a source, forcing the next `build` to
    /// re-expand it regardless of `source_hash`. Used when an admin forces a
    /// refresh (e.g. to pick up new MCP `tools/list` results).
    pub fn invalidate(&self, source_id: &str) {
        self.cache.lock().remove(source_id);
    }
}

fn version_hash(sorted_descriptors: &[ToolDescriptor]) -> u64 {
    let mut hasher = Sha256::new();
    for descriptor in sorted_descriptors {
        hasher.update(descriptor_fingerprint(descriptor).as_bytes());
        hasher.update(b"\0");
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// Holds the current published snapshot per workspace and the builder that
/// produces the next one. `current_snapshot` never blocks on `rebuild`: a
/// reader always sees the last atomically-swapped `Arc`.
pub struct WorkspaceRegistry {
    builder: WorkspaceToolBuilder,
    snapshots: RwLock<HashMap<String, Arc<ToolRegistrySnapshot>>>,
}

impl WorkspaceRegistry {
    pub fn new(builder: WorkspaceToolBuilder) -> Self {
        Self {
            builder,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// The snapshot a new Run should be pinned to. Returns an empty,
    /// version-0 snapshot if the workspace has never been built.
    pub fn current_snapshot(&self, workspace_id: &str) -> Arc<ToolRegistrySnapshot> {
        self.snapshots
            .read()
            .get(workspace_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(ToolRegistrySnapshot::empty()))
    }

    /// Recompiles `workspace_id`'s snapshot from `sources` and publishes it
    /// atomically, returning the diff against whatever was previously
    /// published. In-flight Runs keep holding the `Arc` they were handed at
    /// start, which this swap never touches.
    pub async fn rebuild(
        &self,
        workspace_id: &str,
        sources: &[Source],
    ) -> Result<SnapshotDiff, BuildError> {
        let next = self.builder.build(sources).await?;
        let previous = self.current_snapshot(workspace_id);
        let diff = SnapshotDiff::compute(&previous, &next);
        self.snapshots
            .write()
            .insert(workspace_id.to_string(), Arc::new(next));
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::ConfigManifestExpander;
    use cg_domain::SourceKind;

    fn http_source(id: &str, config: serde_json::Value) -> Source {
        let hash = Source::compute_hash(SourceKind::Http, None, &config);
        Source {
            id: id.into(),
            workspace_id: "ws1".into(),
            name: id.into(),
            kind: SourceKind::Http,
            endpoint: None,
            config,
            enabled: true,
            source_hash: hash,
        }
    }

    fn builder() -> WorkspaceToolBuilder {
        let mut expanders: HashMap<SourceKind, Arc<dyn SourceExpander>> = HashMap::new();
        expanders.insert(SourceKind::Http, Arc::new(ConfigManifestExpander));
        WorkspaceToolBuilder::new(expanders)
    }

    fn tool_manifest(name: &str) -> serde_json::Value {
        serde_json::json!({
            "tools": [{
                "name": name,
                "description": "d",
                "provider": {"kind": "http", "method": "GET", "url_template": "/x"}
            }]
        })
    }

    #[tokio::test]
    async fn builds_snapshot_from_sources() {
        let sources = vec![http_source("s1", tool_manifest("tools.a"))];
        let snapshot = builder().build(&sources).await.unwrap();
        assert_eq!(snapshot.tools.len(), 1);
        assert_eq!(snapshot.tools[0].name, "tools.a");
    }

    #[tokio::test]
    async fn disabled_sources_are_skipped() {
        let mut source = http_source("s1", tool_manifest("tools.a"));
        source.enabled = false;
        let snapshot = builder().build(&[source]).await.unwrap();
        assert!(snapshot.tools.is_empty());
    }

    #[tokio::test]
    async fn colliding_paths_across_sources_are_rejected() {
        let sources = vec![
            http_source("s1", tool_manifest("tools.a")),
            http_source("s2", tool_manifest("tools.a")),
        ];
        let err = builder().build(&sources).await.unwrap_err();
        assert!(matches!(err, BuildError::PathCollision { .. }));
    }

    #[tokio::test]
    async fn unchanged_source_hash_reuses_cached_expansion() {
        let b = builder();
        let source = http_source("s1", tool_manifest("tools.a"));
        let first = b.build(&[source.clone()]).await.unwrap();
        let second = b.build(&[source]).await.unwrap();
        assert_eq!(first.version, second.version);
    }

    #[tokio::test]
    async fn rebuild_diffs_against_previous_snapshot() {
        let registry = WorkspaceRegistry::new(builder());
        let s1 = http_source("s1", tool_manifest("tools.a"));
        let diff = registry.rebuild("ws1", &[s1.clone()]).await.unwrap();
        assert_eq!(diff.added.len(), 1);
        assert!(diff.removed.is_empty());

        let s2 = http_source("s2", tool_manifest("tools.b"));
        let diff = registry.rebuild("ws1", &[s1, s2]).await.unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].name, "tools.b");
    }

    #[tokio::test]
    async fn in_flight_snapshot_survives_a_rebuild() {
        let registry = WorkspaceRegistry::new(builder());
        let s1 = http_source("s1", tool_manifest("tools.a"));
        registry.rebuild("ws1", &[s1.clone()]).await.unwrap();
        let pinned = registry.current_snapshot("ws1");

        registry.rebuild("ws1", &[]).await.unwrap();
        assert_eq!(pinned.tools.len(), 1, "pinned Arc must not observe the later rebuild");
        assert!(registry.current_snapshot("ws1").tools.is_empty());
    }
}

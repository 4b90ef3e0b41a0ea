//! Workspace tool builder (component I, SPEC_FULL §4.I).
//!
//! Compiles `ToolDescriptor`s from a workspace's enabled `Source` records,
//! merges them under strict path-uniqueness, versions the result as
//! `hash(sorted descriptors)`, and publishes it atomically — in-flight
//! Runs keep reading the snapshot they were pinned to (§4.A/§4.I).

pub mod expander;
pub mod registry;

pub use expander::{ConfigManifestExpander, SourceExpander};
pub use registry::{SnapshotDiff, WorkspaceRegistry, WorkspaceToolBuilder};

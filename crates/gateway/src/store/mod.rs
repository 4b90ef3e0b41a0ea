//! Concrete persistence adapters the composition root wires into the
//! ports each `cg-*` crate defines but does not implement itself.

pub mod credential_store;
pub mod policy_store;
pub mod source_store;

pub use credential_store::KeyringCredentialStore;
pub use policy_store::JsonlPolicyStore;
pub use source_store::SourceStore;

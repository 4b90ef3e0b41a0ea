//! `cg-providers` — component D, the transport layer every `ToolDescriptor`
//! dispatches through: HTTP, MCP, GraphQL, and built-in in-process tools.

pub mod builtin;
pub mod graphql;
pub mod http;
pub mod mcp;
pub mod registry;
pub mod traits;

pub use registry::{ProviderInitError, ProviderRegistry};
pub use traits::{InvocationContext, Provider, ProviderError};

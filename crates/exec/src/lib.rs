//! Built-in exec/file/process tools, wrapped by `cg-providers`' builtin
//! provider (component D) behind `ToolDescriptor`s such as `exec.run` and
//! `fs.read`.
//!
//! - `exec`: run commands foreground or auto-background after yieldMs
//! - `file_ops`: read/write/append/move/delete/list, sandboxed to a workspace root
//! - `process`: manage background sessions (list/poll/log/write/kill/clear/remove)

pub mod exec;
pub mod file_ops;
pub mod manager;
pub mod process;

pub use manager::ProcessManager;

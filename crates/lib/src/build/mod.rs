//! Per-module build execution.
//!
//! - [`context`]: the module's working directory, prefix and environment
//! - [`cmd`]: isolated subprocess runner
//! - [`sandbox`]: optional launcher wrapping every command
//! - [`execute`]: build system protocols

pub mod cmd;
pub mod context;
pub mod execute;
pub mod sandbox;

pub use cmd::{CmdError, CommandRunner, Invocation};
pub use context::BuildContext;
pub use execute::{BuildError, BuildStep, build_module, plan_steps};
pub use sandbox::Sandbox;

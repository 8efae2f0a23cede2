//! Bounded execution of external commands.

mod base;
mod pool;
mod process;

pub use base::{CommandId, CommandOutput, CommandRunner, CommandStatus, FinishedCommand};
pub use pool::{CommandPool, CommandPools};
pub use process::ProcessRunner;

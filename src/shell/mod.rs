//! Process execution for approved registry commands.

mod runner;
pub use runner::{ExecutionFailure, ExecutionOutcome, ShellRunner, NO_OUTPUT};

//! Security checks applied before a registry command may run.
//!
//! The registry is the whitelist; this module decides whether a whitelisted
//! entry runs now, needs confirmation, or is refused.

mod gate;

pub use gate::{evaluate, BlockReason, GateDecision, CONFIRMATION_PHRASE};

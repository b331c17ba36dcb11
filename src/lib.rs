//! cmd-gateway - a guarded command-execution gateway
//!
//! Callers ask the gateway to run shell commands by name. Only commands in the
//! JSON registry may run; dangerous ones need an explicit confirmation token.
//! Every decision lands in a date-partitioned audit log.
//!
//! - [`registry`]: command definitions and their on-disk store
//! - [`security`]: the confirmation gate
//! - [`shell`]: shell execution of approved command lines
//! - [`audit`]: audit events and the partitioned log
//! - [`gateway`]: the request-level facade
//! - [`transport`]: JSON-lines adapter over any async reader/writer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmd_gateway::audit::FileAuditLog;
//! use cmd_gateway::gateway::{ExecuteRequest, Gateway};
//! use cmd_gateway::registry::RegistryStore;
//! use cmd_gateway::shell::ShellRunner;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Gateway::new(
//!         RegistryStore::new("/tmp/gw/commands.json"),
//!         Arc::new(FileAuditLog::new("/tmp/gw/logs")),
//!         ShellRunner::new(),
//!     );
//!     gateway.initialize()?;
//!
//!     let response = gateway
//!         .execute(&ExecuteRequest {
//!             name: "echo".to_string(),
//!             args: Some("hello".to_string()),
//!             ..Default::default()
//!         })
//!         .await;
//!     println!("{}", response.text);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod security;
pub mod shell;
pub mod transport;
pub mod utils;
pub mod watch;

// Re-export commonly used types
pub use audit::{AuditEvent, AuditLog, EventKind, FileAuditLog};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayResponse};
pub use registry::{CommandDefinition, RegistryStore};

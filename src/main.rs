//! Main entry point for the cmd-gateway service.
//!
//! Reads configuration from the environment, prepares the registry, then
//! serves JSON-lines requests on stdin/stdout until EOF or a signal.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{error, info, warn};

use cmd_gateway::audit::FileAuditLog;
use cmd_gateway::config::GatewayConfig;
use cmd_gateway::gateway::Gateway;
use cmd_gateway::registry::RegistryStore;
use cmd_gateway::shell::ShellRunner;
use cmd_gateway::utils::logger;
use cmd_gateway::{transport, watch};

/// Why the serve loop ended.
enum Shutdown {
    Eof,
    Interrupt,
    Terminate,
    Failed(anyhow::Error),
}

#[cfg(unix)]
async fn terminate() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

async fn run(gateway: Arc<Gateway>) -> Shutdown {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();

    tokio::select! {
        res = transport::serve(gateway, reader, writer) => match res {
            Ok(()) => Shutdown::Eof,
            Err(e) => Shutdown::Failed(e),
        },
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => Shutdown::Interrupt,
            Err(e) => Shutdown::Failed(e.into()),
        },
        res = terminate() => match res {
            Ok(()) => Shutdown::Terminate,
            Err(e) => Shutdown::Failed(e),
        },
    }
}

async fn start(config: &GatewayConfig) -> Result<i32> {
    let audit = Arc::new(FileAuditLog::new(config.log_dir()));
    let gateway = Gateway::new(
        RegistryStore::new(config.registry_path()),
        audit.clone(),
        ShellRunner::with_timeout(config.exec_timeout),
    )
    .with_port(config.port.clone());

    let count = gateway
        .initialize()
        .with_context(|| format!("cannot use command registry {}", config.registry_path().display()))?;
    gateway.record_started();
    info!("cmd-gateway {} serving {} commands on {}", env!("CARGO_PKG_VERSION"), count, config.port);

    // Keep the watcher alive for the lifetime of the serve loop.
    let _watcher = match watch::RegistryWatcher::new(config.registry_path(), audit) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("Registry watcher disabled: {:#}", e);
            None
        }
    };

    let gateway = Arc::new(gateway);
    let code = match run(Arc::clone(&gateway)).await {
        Shutdown::Eof => {
            gateway.record_stopped("stdin closed");
            0
        }
        Shutdown::Interrupt => {
            gateway.record_stopped("SIGINT");
            0
        }
        Shutdown::Terminate => {
            gateway.record_terminated("SIGTERM");
            0
        }
        Shutdown::Failed(e) => {
            error!("Serve loop failed: {:#}", e);
            gateway.record_uncaught(&format!("{:#}", e), None);
            1
        }
    };
    info!("cmd-gateway shutting down");
    Ok(code)
}

#[tokio::main]
async fn main() {
    let config = GatewayConfig::from_env();
    let guard = logger::init_logging(&config.trace_dir);

    let code = match start(&config).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal: {:#}", e);
            eprintln!("cmd-gateway: {:#}", e);
            1
        }
    };

    // Stdin reads block a runtime thread, so exit without waiting on them.
    drop(guard);
    std::process::exit(code);
}

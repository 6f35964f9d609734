//! Roast gateway daemon entry point.
//!
//! Wires a [`roast_manager::MachineManager`] and a [`roast_stream`] axum
//! router into a running process, optionally starting a simulated roaster
//! for local development, and drives the pair under `#[tokio::main]` until a
//! shutdown signal arrives.

use anyhow::{Context, Result};
use clap::Parser;
use roast_common::{CatalogModel, GatewayConfig};
use roast_manager::MachineManager;
use roast_simulator::SimulatorManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Roast gateway daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "roast-daemon",
    about = "Roast gateway - real-time roaster data-acquisition and control daemon",
    version,
    long_about = None
)]
struct Args {
    /// Path to a gateway configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overridden by `RUST_LOG`.
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Bind address override, `host:port`.
    #[arg(long, short = 'b', value_name = "HOST:PORT")]
    bind: Option<String>,

    /// Start a simulated roaster from a catalog model file (JSON) and
    /// connect it immediately.
    #[arg(long, value_name = "FILE")]
    simulate: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting roast gateway");

    let mut config = load_config(&args)?;
    if let Some(bind) = &args.bind {
        let (host, port) = bind.rsplit_once(':').with_context(|| format!("invalid --bind address: {bind}"))?;
        config.bind_host = host.to_string();
        config.bind_port = port.parse().with_context(|| format!("invalid port in --bind address: {bind}"))?;
    }

    info!(
        bind_host = %config.bind_host,
        bind_port = config.bind_port,
        ring_capacity = config.ring_capacity,
        "configuration loaded"
    );

    let manager = Arc::new(MachineManager::new(config.clone()));
    let mut simulators = SimulatorManager::new();

    if let Some(catalog_path) = &args.simulate {
        start_simulated_machine(&manager, &mut simulators, catalog_path, &config)
            .await
            .with_context(|| format!("failed to start simulator from {catalog_path:?}"))?;
    }

    let router = roast_stream::router(Arc::clone(&manager));
    let listener = TcpListener::bind((config.bind_host.as_str(), config.bind_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.bind_host, config.bind_port))?;
    info!(addr = %listener.local_addr().context("bound listener has no local address")?, "live streaming endpoint listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server failed")?;

    info!("shutting down: disconnecting machines and simulators");
    manager.disconnect_all().await;
    simulators.stop_all().await;
    info!("shutdown complete");

    Ok(())
}

/// Initialize the global `tracing` subscriber. Called exactly once, here.
fn init_logging(level: &str) {
    let filter = format!(
        "roast_daemon={level},roast_manager={level},roast_stream={level},roast_fieldbus={level},roast_simulator={level},roast_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)))
        .with_target(true)
        .init();
}

/// Load configuration from file or fall back to built-in defaults.
fn load_config(args: &Args) -> Result<GatewayConfig> {
    match &args.config {
        Some(path) => GatewayConfig::from_file(path).with_context(|| format!("failed to load config from {path:?}")),
        None => {
            info!("no --config given, using built-in defaults");
            Ok(GatewayConfig::default())
        }
    }
}

/// Parse a catalog model file, start a simulator for it, and connect the
/// resulting machine to the manager.
async fn start_simulated_machine(
    manager: &MachineManager,
    simulators: &mut SimulatorManager,
    catalog_path: &std::path::Path,
    config: &GatewayConfig,
) -> Result<()> {
    let content = std::fs::read_to_string(catalog_path).with_context(|| format!("failed to read {catalog_path:?}"))?;
    let model: CatalogModel =
        serde_json::from_str(&content).with_context(|| format!("failed to parse catalog model from {catalog_path:?}"))?;

    info!(model = %model.name, "starting simulator");

    let info = simulators
        .start(
            &config.simulator.host,
            None,
            Some(model.id.clone()),
            model.name.clone(),
            model.et.clone(),
            model.bt.clone(),
            model.extra_channels.clone(),
            model.controls.clone(),
        )
        .await
        .context("failed to start simulator")?;

    let machine = simulators.machine(&info.machine_id).context("simulator started but its bound machine is missing")?;

    info!(machine_id = %info.machine_id, port = info.port, "simulator running, connecting machine");
    manager.connect_machine(machine).await.context("failed to connect simulated machine")?;

    Ok(())
}

/// Resolves once `tokio::signal::ctrl_c()` fires, or on Unix once `SIGTERM`
/// is received - the async equivalent of the reference daemon's
/// signal-driven shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_defaults() {
        let args = Args::parse_from(["roast-daemon"]);
        assert!(args.config.is_none());
        assert_eq!(args.log_level, "info");
        assert!(args.bind.is_none());
        assert!(args.simulate.is_none());
    }

    #[test]
    fn args_parse_overrides() {
        let args = Args::parse_from(["roast-daemon", "-c", "gateway.toml", "-b", "0.0.0.0:9000", "-l", "debug"]);
        assert_eq!(args.config, Some(PathBuf::from("gateway.toml")));
        assert_eq!(args.bind, Some("0.0.0.0:9000".to_string()));
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn load_config_falls_back_to_defaults_without_a_path() {
        let args = Args::parse_from(["roast-daemon"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.bind_port, GatewayConfig::default().bind_port);
    }

    #[test]
    fn load_config_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "bind_port = 9100\n").unwrap();

        let args = Args::parse_from(["roast-daemon", "-c", path.to_str().unwrap()]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.bind_port, 9100);
    }
}

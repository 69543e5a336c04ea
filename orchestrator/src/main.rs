use std::{io, path::PathBuf, sync::Arc};

use clap::Parser;
use log::{info, warn};
use orchestrator::{Allocator, ScriptProvisioner, TcpProber, api, configs::OrchestratorConfig};
use tokio::{net::TcpListener, signal};

#[derive(Debug, Parser)]
#[command(about = "Allocates training clients to edge servers")]
struct Args {
    /// Path to the orchestrator's JSON configuration.
    #[arg(long, env = "ORCHESTRATOR_CONFIG", default_value = "configs/orchestrator.json")]
    config: PathBuf,
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!("cannot listen for SIGTERM: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = OrchestratorConfig::load(&args.config)?;

    let mut provisioner = ScriptProvisioner::new(
        &config.orchestrator.run_edge_path,
        &config.orchestrator.kill_edge_path,
    );
    if let Some(timeout) = config.provision_timeout() {
        provisioner = provisioner.with_timeout(timeout);
    }
    provisioner
        .check()
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;

    let prober = TcpProber::new(config.probe_backoff());
    let allocator = Arc::new(Allocator::new(prober, provisioner, config.allocator_config())?);

    let monitor = {
        let allocator = Arc::clone(&allocator);
        let period = config.health_interval();
        tokio::spawn(async move { allocator.monitor(period).await })
    };

    let addr = config.network.addr();
    let list = TcpListener::bind(&addr).await?;
    info!("orchestrator listening at {addr}");

    axum::serve(list, api::router(Arc::clone(&allocator)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, stopping every edge server");
    monitor.abort();
    allocator.shutdown().await;

    Ok(())
}

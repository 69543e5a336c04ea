use std::{io, path::PathBuf};

use aggregator::{
    FedAvg, ProxyClient, RemoteClient, RoundDriver, Tier, config::NodeConfig, serve,
};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    signal,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Edge,
    Root,
}

#[derive(Debug, Parser)]
#[command(about = "Runs an edge or root aggregation node")]
struct Args {
    /// Path to the node's JSON configuration.
    #[arg(long, env = "NODE_CONFIG")]
    config: PathBuf,

    /// Node scope used for checkpoints and round logs.
    #[arg(long, env = "NODE_NAME")]
    name: String,

    #[arg(long, value_enum, default_value = "edge")]
    role: Role,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = NodeConfig::load(&args.config)?;

    let tier = match args.role {
        Role::Edge => Tier::Edge,
        Role::Root => Tier::Root,
    };

    let upstream = match (tier, &config.upstream) {
        (Tier::Edge, Some(upstream)) => Some(upstream.addr()),
        (Tier::Edge, None) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "an edge node needs an upstream address",
            ));
        }
        (Tier::Root, _) => None,
    };

    let mut fedavg = FedAvg::open(
        tier,
        &args.name,
        &config.model.save_path,
        &config.logging.log_path,
    )?;

    if let Some(path) = &config.model.initial_checkpoint {
        fedavg = fedavg.with_initial_checkpoint(path);
    }

    let proxy = ProxyClient::new(&args.name, fedavg.latest(), fedavg.round_log().clone());
    let mut driver = RoundDriver::new(fedavg, config.round_config());

    let addr = config.network.addr();
    let list = TcpListener::bind(&addr).await?;
    info!("{} listening at {addr} as {tier:?}", args.name);

    let required = config.fed_avg.min_available_clients;
    let accept = async {
        while driver.available() < required {
            let (stream, peer) = list.accept().await?;
            let (rx, tx) = stream.into_split();
            let (rx, tx) = comms::channel(rx, tx);
            driver.add_client(Box::new(RemoteClient::new(peer.to_string(), rx, tx)));
        }

        io::Result::Ok(())
    };

    tokio::select! {
        ret = accept => ret?,
        _ = signal::ctrl_c() => {
            info!("interrupted while waiting for clients");
            return Ok(());
        }
    }

    let upstream = match upstream {
        Some(addr) => {
            let stream = TcpStream::connect(&addr).await?;
            info!("serving aggregates to {addr}");

            let (rx, tx) = stream.into_split();
            let (rx, tx) = comms::channel(rx, tx);
            let mut proxy = proxy;
            Some(tokio::spawn(async move { serve(&mut proxy, rx, tx).await }))
        }
        None => None,
    };

    tokio::select! {
        ret = driver.run() => {
            let params = ret?;
            info!("rounds finished with {} arrays", params.len());
        }
        _ = signal::ctrl_c() => {
            info!("interrupted, stopping the rounds");
            return Ok(());
        }
    }

    if let Some(handle) = upstream {
        match handle.await {
            Ok(ret) => ret?,
            Err(e) => warn!("upstream session ended abruptly: {e}"),
        }
    }

    info!("wrapping up");
    Ok(())
}

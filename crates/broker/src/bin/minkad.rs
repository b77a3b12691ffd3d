#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use minka_broker::{catalog, kraft, Broker, BrokerServer, PartitionStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LISTEN_ADDR: &str = "0.0.0.0:9092";

/// Minimal broker speaking a subset of the Kafka wire protocol.
#[derive(Debug, Parser)]
#[command(name = "minkad", version)]
struct Args {
    /// Topic properties file used when the cluster metadata log is absent.
    properties: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let catalog = catalog::bootstrap(
        Path::new(kraft::CLUSTER_METADATA_LOG_PATH),
        args.properties.as_deref(),
    );
    let broker = Broker::new(catalog, PartitionStore::default());

    let server = match BrokerServer::bind(LISTEN_ADDR, broker).await {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "failed to bind {LISTEN_ADDR}");
            return ExitCode::from(1);
        }
    };
    info!("listening on {LISTEN_ADDR}");

    if let Err(err) = server.serve().await {
        error!(error = %err, "server terminated");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

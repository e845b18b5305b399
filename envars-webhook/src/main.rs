//! The envars admission webhook binary.
use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{info, Level};

use envars_webhook::{
    config::Config,
    dispatch::Dispatcher,
    server::webhook_task,
    store::{KubeStore, ObjectStore},
};

#[derive(Parser, Debug, Clone)]
#[command(name = "envars-webhook")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[arg(short, long)]
    /// Path to the configuration file.
    config_file: PathBuf,
    /// The path to the TLS certificate.
    #[arg(long, default_value = "/run/secrets/tls/tls.crt")]
    tls_cert: PathBuf,
    /// The path to the TLS key.
    #[arg(long, default_value = "/run/secrets/tls/tls.key")]
    tls_key: PathBuf,
    /// The port to listen on.
    /// Default is 8443.
    #[arg(short, long, default_value = "8443")]
    port: u16,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse the CLI arguments
    let args = Args::try_parse()?;

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Parsed CLI arguments: {:?}", args);

    // The configuration is loaded once, it does not change while the webhook runs.
    let config = Config::from_file(&args.config_file).context("Failed to load configuration file")?;
    info!(
        containers = ?config.containers_allowed,
        "Loaded container allow-list"
    );

    let kube_client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(kube_client));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(config), store));

    info!("starting admission controller ...");
    webhook_task(
        &args.tls_cert,
        &args.tls_key,
        args.port,
        dispatcher,
        async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for CTRL+C: {}", err);
                std::future::pending::<()>().await;
            }
        },
    )
    .await;

    info!("Exiting admission server");

    Ok(())
}

//! tgsync - target-group membership sync daemon
//!
//! Polls the control plane for managed nodes and keeps each node's
//! load-balancer target-group membership matched to its node configuration.
//! Runs forever: every failure is logged and the loop sleeps into the next
//! cycle; nothing terminates the process.

use clap::Parser;
use std::time::Duration;
use tgsync::{load_aws_config, run_cycle, ControlPlaneClient, ElbProvider, Reconciler, SyncError};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// tgsync: keep load-balancer target groups in sync with cluster nodes
#[derive(Parser)]
#[command(name = "tgsync")]
#[command(about = "Reconciles node target-group membership against the control plane", long_about = None)]
struct Cli {
    /// Control-plane API key
    #[arg(long, env = "CASTAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Cluster id to reconcile
    #[arg(long, env = "CLUSTER_ID")]
    cluster_id: Option<String>,

    /// AWS region hosting the target groups
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Control-plane API base URL
    #[arg(long, env = "CASTAI_API_URL", default_value = "https://api.cast.ai")]
    api_url: String,

    /// Seconds between reconciliation cycles
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 60)]
    interval: u64,
}

/// Fully-resolved runtime settings
struct Settings {
    api_key: String,
    cluster_id: String,
    region: String,
}

impl Settings {
    /// Validate the required values, naming everything that is missing
    fn from_cli(cli: &Cli) -> Result<Self, SyncError> {
        let mut missing = Vec::new();
        if cli.api_key.is_none() {
            missing.push("--api-key / CASTAI_API_KEY");
        }
        if cli.cluster_id.is_none() {
            missing.push("--cluster-id / CLUSTER_ID");
        }
        if cli.region.is_none() {
            missing.push("--region / AWS_REGION");
        }

        match (&cli.api_key, &cli.cluster_id, &cli.region) {
            (Some(api_key), Some(cluster_id), Some(region)) => Ok(Self {
                api_key: api_key.clone(),
                cluster_id: cluster_id.clone(),
                region: region.clone(),
            }),
            _ => Err(SyncError::config(format!(
                "missing required configuration: {}",
                missing.join(", ")
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tgsync=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let interval = Duration::from_secs(cli.interval.max(1));

    // Misconfiguration is fatal for the cycle, never for the process: log at
    // the highest severity, sleep, retry.
    let settings = loop {
        match Settings::from_cli(&cli) {
            Ok(settings) => break settings,
            Err(e) => {
                error!(error = %e, "Cannot start a cycle, retrying after interval");
                tokio::time::sleep(interval).await;
            }
        }
    };

    let source = ControlPlaneClient::new(&cli.api_url, &settings.api_key, &settings.cluster_id)?;
    let aws_config = load_aws_config(&settings.region).await;
    let reconciler = Reconciler::new(ElbProvider::from_config(&aws_config));

    info!(
        cluster = %settings.cluster_id,
        region = %settings.region,
        api_url = %cli.api_url,
        interval_secs = interval.as_secs(),
        "🔄 tgsync starting"
    );

    // The outermost failure boundary: nothing escapes this loop.
    loop {
        match run_cycle(&source, &reconciler).await {
            Ok(stats) => {
                info!(
                    nodes = stats.nodes,
                    reconciled = stats.reconciled,
                    skipped = stats.skipped,
                    "Cycle finished"
                );
            }
            Err(e) => {
                error!(error = %e, "Cycle failed, will retry next tick");
            }
        }

        info!(
            seconds = interval.as_secs(),
            "Sleeping until next cycle"
        );
        tokio::time::sleep(interval).await;
    }
}

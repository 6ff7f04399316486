use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clockvote::cli::NodeCli;
use clockvote::node::{ClockSource, NodeId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clockvote=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = NodeCli::parse();
    if args.node_id == 0 {
        anyhow::bail!("node id must be at least 1");
    }

    let source = ClockSource::new(NodeId::new(args.node_id));
    source
        .run(
            args.coordinator_address(),
            Duration::from_millis(args.reconnect_backoff_ms),
        )
        .await;
    Ok(())
}

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clockvote::api;
use clockvote::cli;
use clockvote::coordinator::Coordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clockvote=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();
    let http_address = settings.http_socket_addr()?;

    let coordinator = Coordinator::start(settings).await?;
    let control = api::api(api::ControlState::from(&coordinator));

    info!("Starting clockvote control API on {}", http_address);
    axum::Server::bind(&http_address)
        .serve(control.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    info!("Shutting down coordinator");
    coordinator.shutdown().await?;
    Ok(())
}

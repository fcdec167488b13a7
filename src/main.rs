mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use wabridge_core::{MessageRelay, SessionProvider};
use wabridge_relay::WebhookRelay;
use wabridge_server::AppState;
use wabridge_session::{BackoffPolicy, BridgeService, SidecarProvider};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    wabridge_telemetry::init_telemetry(&cli.telemetry()).context("failed to initialize logging")?;

    tracing::info!(
        webhook_url = %cli.webhook_url,
        session_dir = %cli.session_dir.display(),
        "starting wabridge"
    );

    std::fs::create_dir_all(&cli.session_dir).with_context(|| {
        format!("failed to create session directory {}", cli.session_dir.display())
    })?;

    let relay = Arc::new(WebhookRelay::new(cli.relay()).context("failed to build webhook client")?);
    let provider: Arc<dyn SessionProvider> = Arc::new(SidecarProvider::new(cli.sidecar()));
    let service = Arc::new(BridgeService::spawn(
        provider,
        Arc::clone(&relay) as Arc<dyn MessageRelay>,
        BackoffPolicy::default(),
    ));

    let server = wabridge_server::start(
        cli.server(),
        AppState {
            service: Arc::clone(&service),
            relay,
        },
    )
    .await
    .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;

    service.connect().await;
    tracing::info!(port = server.port, "wabridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    server.stop().await;
    service.shutdown().await;
    Ok(())
}

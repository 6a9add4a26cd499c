//! tv-mt5-bridge entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tv_mt5_bridge::config::BridgeConfig;
use tv_mt5_bridge::state::AppState;
use tv_mt5_bridge::tunnel::TunnelSupervisor;
use tv_mt5_bridge::webhook::WebhookServer;
use tv_mt5_bridge::{build_session, diagnostics, logging};

#[derive(Parser)]
#[command(name = "tv-mt5-bridge", about = "TradingView to MT5 integration", version)]
struct Cli {
    /// Do not start the ngrok tunnel
    #[arg(long)]
    no_ngrok: bool,

    /// Test the MT5 connection and exit
    #[arg(long)]
    test_mt5: bool,

    /// Start only the ngrok tunnel, without the HTTP server
    #[arg(long)]
    ngrok_only: bool,

    /// Trade against the in-memory paper terminal
    #[arg(long)]
    paper: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::from_env().context("Failed to load configuration")?;

    let log_name = if cli.test_mt5 {
        "mt5_test"
    } else if cli.ngrok_only {
        "ngrok"
    } else {
        "main"
    };
    logging::init(&config.logging, log_name);

    if cli.test_mt5 {
        let mut session = build_session(&config, cli.paper)?;
        diagnostics::run_connection_test(&mut session)
            .await
            .context("MT5 connection test failed")?;
        return Ok(());
    }

    if cli.ngrok_only {
        let mut tunnel = TunnelSupervisor::new(config.tunnel.clone(), config.server.port);
        tunnel.start().context("Failed to start Ngrok")?;
        info!("Started Ngrok only. Press Ctrl+C to exit.");
        tokio::signal::ctrl_c().await?;
        info!("Ngrok tunnel stopped by user");
        tunnel.stop().await;
        return Ok(());
    }

    info!("Starting TradingView to MT5 integration application");

    let session = build_session(&config, cli.paper)?;
    let state = Arc::new(AppState::new(config.clone(), session));

    // A failed first connect is retried on the first request
    if let Err(e) = state.session.lock().await.connect().await {
        error!("Failed to connect to MT5: {}", e);
    }

    let mut tunnel = None;
    if !cli.no_ngrok {
        let mut supervisor = TunnelSupervisor::new(config.tunnel.clone(), config.server.port);
        match supervisor.start() {
            Ok(()) => tunnel = Some(supervisor),
            Err(e) => warn!("Continuing without Ngrok: {}", e),
        }
    }

    let mut server = WebhookServer::new(state.clone());
    if let Err(e) = server.start().await {
        if let Some(mut tunnel) = tunnel {
            tunnel.stop().await;
        }
        anyhow::bail!(e);
    }

    tokio::signal::ctrl_c().await?;
    info!("Application terminated by user");

    info!("Shutting down application");
    server.stop().await;
    if let Some(mut tunnel) = tunnel {
        tunnel.stop().await;
    }
    state.session.lock().await.close().await;

    Ok(())
}

//! Public tunnel for the webhook endpoint
//!
//! TradingView can only deliver alerts to a public URL. The supervisor runs
//! an ngrok agent pointing at the local server, publishes the webhook URL
//! and restarts the tunnel when it disappears.

mod ngrok;

pub use ngrok::{
    pick_public_url, render_url_file, save_webhook_url, webhook_url, NgrokApi, NgrokProcess,
    TunnelEntry,
};

use crate::config::TunnelConfig;
use crate::error::{AppError, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Polls of the local API while a fresh agent comes up
const STARTUP_POLL_ATTEMPTS: u32 = 20;
const STARTUP_POLL_DELAY: Duration = Duration::from_millis(500);

/// Background ngrok tunnel manager
pub struct TunnelSupervisor {
    config: TunnelConfig,
    port: u16,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl TunnelSupervisor {
    pub fn new(config: TunnelConfig, port: u16) -> Self {
        Self {
            config,
            port,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Spawn the supervision task. Fails without a configured auth token.
    pub fn start(&mut self) -> Result<()> {
        if !self.config.has_auth_token() {
            error!("Ngrok auth token not set. Please set NGROK_AUTH_TOKEN in your .env file.");
            error!(
                "You can get your auth token from {}",
                "https://dashboard.ngrok.com/get-started/your-authtoken"
            );
            return Err(AppError::Config("NGROK_AUTH_TOKEN is not set".to_string()));
        }

        let api = NgrokApi::new(&self.config.api_url)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let config = self.config.clone();
        let port = self.port;
        self.task = Some(tokio::spawn(async move {
            supervise(config, port, api, shutdown_rx).await;
        }));

        info!("Tunnel supervisor started");
        Ok(())
    }

    /// Stop supervising and kill the agent
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Tunnel supervisor task failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

/// Start the agent and publish its webhook URL
async fn establish(
    config: &TunnelConfig,
    port: u16,
    api: &NgrokApi,
    restarted: bool,
) -> Result<NgrokProcess> {
    info!("Connecting to Ngrok...");
    let mut process = NgrokProcess::spawn(&config.binary, port, &config.auth_token)?;

    let polled = api
        .wait_for_public_url(STARTUP_POLL_ATTEMPTS, STARTUP_POLL_DELAY)
        .await;
    let public_url = match polled {
        Ok(url) => url,
        Err(e) => {
            if process.has_exited() {
                warn!("Ngrok process exited during startup");
            }
            process.kill().await;
            return Err(e);
        }
    };
    let webhook = webhook_url(&public_url);

    if restarted {
        info!("Ngrok tunnel re-established: {}", webhook);
    } else {
        info!("Ngrok tunnel established: {}", public_url);
        info!("Use this URL as your TradingView webhook: {}", webhook);
    }

    if let Err(e) = save_webhook_url(&config.url_file, &webhook) {
        warn!("Failed to write {}: {}", config.url_file.display(), e);
    }

    let banner = "=".repeat(50);
    let label = if restarted { "NEW WEBHOOK URL" } else { "WEBHOOK URL" };
    println!("\n{banner}\n{label}: {webhook}");
    println!("Use this URL in your TradingView alert settings\n{banner}\n");

    Ok(process)
}

async fn supervise(
    config: TunnelConfig,
    port: u16,
    api: NgrokApi,
    mut shutdown: watch::Receiver<bool>,
) {
    // A pending startup is abandoned on shutdown; dropping the agent kills it
    let first = tokio::select! {
        result = establish(&config, port, &api, false) => result,
        _ = shutdown.changed() => {
            info!("Ngrok tunnel stopped");
            return;
        }
    };
    let mut process = match first {
        Ok(process) => Some(process),
        Err(e) => {
            error!("Error with Ngrok tunnel: {}", e);
            None
        }
    };

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.check_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let healthy = match api.tunnels().await {
            Ok(tunnels) => !tunnels.is_empty(),
            Err(e) => {
                warn!("Ngrok API check failed: {}", e);
                false
            }
        };
        if healthy {
            continue;
        }

        warn!("Ngrok tunnel closed unexpectedly, restarting...");
        if let Some(stale) = process.take() {
            stale.kill().await;
        }
        let restarted = tokio::select! {
            result = establish(&config, port, &api, true) => result,
            _ = shutdown.changed() => break,
        };
        match restarted {
            Ok(fresh) => process = Some(fresh),
            Err(e) => error!("Failed to restart Ngrok tunnel: {}", e),
        }
    }

    info!("Ngrok tunnel stopped");
    if let Some(process) = process {
        process.kill().await;
    }
}

//! ngrok agent process and its local inspection API

use crate::error::{AppError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use url::Url;

/// Public endpoint TradingView alerts are sent to
const WEBHOOK_PATH: &str = "/trade";

/// One entry of `GET /api/tunnels`
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelEntry {
    pub public_url: String,
    #[serde(default)]
    pub proto: String,
}

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<TunnelEntry>,
}

/// Prefer the https tunnel; TradingView rejects plain http webhooks
pub fn pick_public_url(tunnels: &[TunnelEntry]) -> Option<String> {
    tunnels
        .iter()
        .find(|t| t.proto == "https" || t.public_url.starts_with("https://"))
        .or_else(|| tunnels.first())
        .map(|t| t.public_url.trim_end_matches('/').to_string())
}

pub fn webhook_url(public_url: &str) -> String {
    format!("{}{}", public_url.trim_end_matches('/'), WEBHOOK_PATH)
}

/// Contents of the webhook URL file: the base URL block, then the URL to
/// paste into TradingView
pub fn render_url_file(webhook_url: &str) -> String {
    let base_url = webhook_url
        .rsplit_once('/')
        .map(|(base, _)| base)
        .unwrap_or(webhook_url);

    format!(
        "base URL (optional: only needed if you are testing with Postman \
         - `ngrokUrl` environment variable)\n\
         ===============\n\
         {base_url}\n\
         \n\
         \n\
         paste this URL in TradingView alerts Webhook URL section\n\
         ===============\n\
         {webhook_url}\n"
    )
}

pub fn save_webhook_url(path: &Path, webhook_url: &str) -> Result<()> {
    std::fs::write(path, render_url_file(webhook_url))?;
    info!("Webhook URL saved to {}", path.display());
    Ok(())
}

/// Client for the agent's local API (default http://127.0.0.1:4040)
pub struct NgrokApi {
    client: Client,
    tunnels_url: Url,
}

impl NgrokApi {
    pub fn new(api_url: &str) -> Result<Self> {
        let base = Url::parse(api_url)
            .map_err(|e| AppError::Config(format!("Invalid NGROK_API_URL '{}': {}", api_url, e)))?;
        let tunnels_url = base
            .join("/api/tunnels")
            .map_err(|e| AppError::Config(format!("Invalid NGROK_API_URL '{}': {}", api_url, e)))?;

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        Ok(Self { client, tunnels_url })
    }

    pub async fn tunnels(&self) -> Result<Vec<TunnelEntry>> {
        let list: TunnelList = self
            .client
            .get(self.tunnels_url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.tunnels)
    }

    /// Poll until the agent reports a tunnel or `attempts` run out
    pub async fn wait_for_public_url(&self, attempts: u32, delay: Duration) -> Result<String> {
        for attempt in 1..=attempts {
            match self.tunnels().await {
                Ok(tunnels) => {
                    if let Some(url) = pick_public_url(&tunnels) {
                        return Ok(url);
                    }
                    debug!("ngrok reports no tunnels yet (attempt {})", attempt);
                }
                Err(e) => debug!("ngrok API not ready (attempt {}): {}", attempt, e),
            }
            tokio::time::sleep(delay).await;
        }
        Err(AppError::Tunnel("ngrok did not report a public URL".to_string()))
    }
}

/// Running `ngrok http <port>` agent
pub struct NgrokProcess {
    child: Child,
}

impl NgrokProcess {
    pub fn spawn(binary: &str, port: u16, auth_token: &str) -> Result<Self> {
        info!("Starting Ngrok tunnel to port {}", port);
        let child = Command::new(binary)
            .arg("http")
            .arg(port.to_string())
            .arg("--authtoken")
            .arg(auth_token)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Tunnel(format!("Failed to start {}: {}", binary, e)))?;
        Ok(Self { child })
    }

    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    pub async fn kill(mut self) {
        match self.child.kill().await {
            Ok(()) => info!("Ngrok tunnel closed"),
            Err(e) => warn!("Failed to kill Ngrok process: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    fn entry(url: &str, proto: &str) -> TunnelEntry {
        TunnelEntry {
            public_url: url.to_string(),
            proto: proto.to_string(),
        }
    }

    #[test]
    fn test_https_tunnel_is_preferred() {
        let tunnels = vec![
            entry("http://abc.ngrok.io", "http"),
            entry("https://abc.ngrok.io/", "https"),
        ];
        assert_eq!(pick_public_url(&tunnels).unwrap(), "https://abc.ngrok.io");
        assert_eq!(pick_public_url(&[]), None);
    }

    #[test]
    fn test_webhook_url_file() {
        let url = webhook_url("https://abc.ngrok-free.app");
        assert_eq!(url, "https://abc.ngrok-free.app/trade");

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("webhook_url.txt");
        save_webhook_url(&path, &url).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "===============");
        assert_eq!(lines[2], "https://abc.ngrok-free.app");
        assert_eq!(lines[5], "paste this URL in TradingView alerts Webhook URL section");
        assert_eq!(lines[7], "https://abc.ngrok-free.app/trade");
    }

    #[tokio::test]
    async fn test_public_url_from_local_api() {
        let app = Router::new().route(
            "/api/tunnels",
            get(|| async {
                Json(json!({
                    "tunnels": [
                        { "public_url": "https://abc.ngrok-free.app", "proto": "https" }
                    ],
                    "uri": "/api/tunnels"
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let api = NgrokApi::new(&format!("http://{}", addr)).unwrap();
        let url = api
            .wait_for_public_url(3, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(url, "https://abc.ngrok-free.app");
    }

    #[tokio::test]
    async fn test_missing_binary_is_tunnel_error() {
        let result = NgrokProcess::spawn("/nonexistent/ngrok-binary", 5000, "token");
        assert!(matches!(result, Err(AppError::Tunnel(_))));
    }
}

//! MT5 gateway adapter
//!
//! The MetaTrader 5 terminal only exposes its API in-process on Windows.
//! A small gateway runs next to the terminal and relays each call as
//! `POST <gateway_url>/<method>` with a JSON body. Replies are
//! `{"ok": bool, "result": ..., "error": {"code": .., "message": ..}}`.

use super::types::*;
use super::Terminal;
use crate::config::Mt5Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

/// Error code reported when the gateway itself cannot be reached
const GATEWAY_UNREACHABLE: i64 = -10004;

#[derive(Debug, Deserialize)]
struct GatewayReply<T> {
    ok: bool,
    result: Option<T>,
    error: Option<TerminalError>,
}

/// Terminal reached through the HTTP gateway
pub struct GatewayTerminal {
    client: Client,
    base_url: Url,
    /// Failure recorded on this side of the wire (transport, decoding)
    local_error: Mutex<Option<TerminalError>>,
}

impl GatewayTerminal {
    pub fn new(config: &Mt5Config) -> Result<Self> {
        let mut raw = config.gateway_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)
            .map_err(|e| AppError::Config(format!("Invalid MT5_GATEWAY_URL '{}': {}", raw, e)))?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            local_error: Mutex::new(None),
        })
    }

    fn record(&self, code: i64, message: String) {
        warn!("MT5 gateway error {}: {}", code, message);
        *self.local_error.lock() = Some(TerminalError::new(code, message));
    }

    /// Invoke a gateway method, returning `None` on any failure
    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Option<T> {
        let url = match self.base_url.join(method) {
            Ok(url) => url,
            Err(e) => {
                self.record(GATEWAY_UNREACHABLE, format!("Invalid method URL {}: {}", method, e));
                return None;
            }
        };

        debug!("MT5 gateway call {} {}", method, body);

        let response = match self.client.post(url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                self.record(GATEWAY_UNREACHABLE, format!("Gateway request failed: {}", e));
                return None;
            }
        };

        let reply: GatewayReply<T> = match response.json().await {
            Ok(reply) => reply,
            Err(e) => {
                self.record(
                    GATEWAY_UNREACHABLE,
                    format!("Invalid gateway reply to {}: {}", method, e),
                );
                return None;
            }
        };

        if !reply.ok {
            let err = reply
                .error
                .unwrap_or_else(|| TerminalError::new(-1, format!("{} failed", method)));
            self.record(err.code, err.message);
            return None;
        }

        *self.local_error.lock() = None;
        reply.result
    }

    /// Methods that only report success
    async fn call_flag(&self, method: &str, body: Value) -> bool {
        self.call::<Value>(method, body).await.is_some()
    }
}

#[async_trait]
impl Terminal for GatewayTerminal {
    fn id(&self) -> &'static str {
        "gateway"
    }

    async fn initialize(&self, path: &str) -> bool {
        self.call_flag("initialize", json!({ "path": path })).await
    }

    async fn login(&self, account: u64, password: &str, server: &str) -> bool {
        self.call_flag(
            "login",
            json!({ "login": account, "password": password, "server": server }),
        )
        .await
    }

    async fn shutdown(&self) {
        let _ = self.call::<Value>("shutdown", json!({})).await;
    }

    async fn is_alive(&self) -> bool {
        let info = self.call::<Value>("terminal_info", json!({})).await;
        matches!(info, Some(info) if !info.is_null())
    }

    async fn last_error(&self) -> TerminalError {
        let local = self.local_error.lock().clone();
        if let Some(err) = local {
            return err;
        }
        self.call::<TerminalError>("last_error", json!({}))
            .await
            .unwrap_or_else(TerminalError::success)
    }

    async fn account_info(&self) -> Option<AccountInfo> {
        self.call("account_info", json!({})).await
    }

    async fn symbols(&self) -> Option<Vec<String>> {
        #[derive(Deserialize)]
        struct SymbolName {
            name: String,
        }

        self.call::<Vec<SymbolName>>("symbols_get", json!({}))
            .await
            .map(|symbols| symbols.into_iter().map(|s| s.name).collect())
    }

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        self.call("symbol_info", json!({ "symbol": symbol })).await
    }

    async fn symbol_select(&self, symbol: &str) -> bool {
        self.call::<bool>("symbol_select", json!({ "symbol": symbol, "enable": true }))
            .await
            .unwrap_or(false)
    }

    async fn symbol_tick(&self, symbol: &str) -> Option<Tick> {
        self.call("symbol_info_tick", json!({ "symbol": symbol })).await
    }

    async fn order_send(&self, request: &OrderRequest) -> Option<OrderSendResult> {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(e) => {
                self.record(-2, format!("Failed to encode order request: {}", e));
                return None;
            }
        };
        self.call("order_send", json!({ "request": body })).await
    }

    async fn positions(&self, filter: &PositionFilter) -> Option<Vec<PositionRecord>> {
        let body = match filter {
            PositionFilter::All => json!({}),
            PositionFilter::Symbol(symbol) => json!({ "symbol": symbol }),
            PositionFilter::Ticket(ticket) => json!({ "ticket": ticket }),
        };
        self.call("positions_get", body).await
    }

    async fn recent_rates(&self, symbol: &str, count: usize) -> Vec<RateBar> {
        self.call(
            "copy_rates_from_pos",
            json!({ "symbol": symbol, "timeframe": "M1", "start_pos": 0, "count": count }),
        )
        .await
        .unwrap_or_default()
    }
}

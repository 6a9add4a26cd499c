//! Webhook and REST API server module
//!
//! Provides:
//! - TradingView alert webhook (`POST /trade`)
//! - Position listing and closing
//! - Symbol search, health check, service info
//!
//! Usage:
//! 1. Start the bridge (the ngrok tunnel starts with it unless `--no-ngrok`)
//! 2. Paste `<ngrok_url>/trade` into the TradingView alert's Webhook URL
//! 3. Use an alert message such as
//!    `{"symbol": "{{ticker}}", "side": "{{strategy.order.action}}", "volume": 0.1}`

mod server;
pub mod handlers;
mod types;

pub use server::{router, WebhookServer};
pub use types::{
    HealthResponse,
    InfoResponse,
    OrderResponse,
    PositionsQuery,
    PositionsResponse,
    SymbolsQuery,
    SymbolsResponse,
};

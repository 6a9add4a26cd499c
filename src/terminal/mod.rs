//! MetaTrader 5 terminal capability
//!
//! The bridge never talks to a terminal directly. Everything it needs is
//! expressed by the [`Terminal`] trait; adapters provide it:
//! - [`gateway::GatewayTerminal`] - live terminal behind an HTTP/JSON gateway
//! - [`paper::PaperTerminal`] - in-memory simulation (dry runs, tests)
//!
//! [`TerminalSession`] owns the adapter and the lazy-reconnect logic.

pub mod types;
pub mod gateway;
pub mod paper;
mod session;

use async_trait::async_trait;
use types::*;

pub use session::{SharedSession, TerminalSession};

/// Operations of the trading terminal used by the bridge.
///
/// Query methods return `None`/empty on failure, as the terminal does;
/// the reason is then available from [`Terminal::last_error`].
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Adapter ID (e.g., "gateway", "paper")
    fn id(&self) -> &'static str;

    /// Attach to the terminal process
    async fn initialize(&self, path: &str) -> bool;

    /// Log into a trading account
    async fn login(&self, account: u64, password: &str, server: &str) -> bool;

    /// Detach from the terminal
    async fn shutdown(&self);

    /// Whether the terminal still answers (`terminal_info` is available)
    async fn is_alive(&self) -> bool;

    /// Error of the last failed call
    async fn last_error(&self) -> TerminalError;

    async fn account_info(&self) -> Option<AccountInfo>;

    /// Names of every symbol the broker offers
    async fn symbols(&self) -> Option<Vec<String>>;

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo>;

    /// Add a symbol to Market Watch
    async fn symbol_select(&self, symbol: &str) -> bool;

    async fn symbol_tick(&self, symbol: &str) -> Option<Tick>;

    /// Submit a trade request
    async fn order_send(&self, request: &OrderRequest) -> Option<OrderSendResult>;

    /// Open positions matching `filter`; `None` when the query failed
    async fn positions(&self, filter: &PositionFilter) -> Option<Vec<PositionRecord>>;

    /// Most recent M1 bars, newest last
    async fn recent_rates(&self, symbol: &str, count: usize) -> Vec<RateBar>;
}

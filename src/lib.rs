//! TradingView to MetaTrader 5 bridge
//!
//! Receives TradingView alert webhooks, normalizes them into trade intents
//! and executes them as market orders on an MT5 terminal. Also exposes open
//! positions, position closing and symbol search over HTTP, and keeps an
//! ngrok tunnel open so TradingView can reach the webhook.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod services;
pub mod signal;
pub mod state;
pub mod terminal;
pub mod tunnel;
pub mod webhook;

use config::BridgeConfig;
use std::sync::Arc;
use terminal::{gateway::GatewayTerminal, paper::PaperTerminal, Terminal, TerminalSession};

/// Session over the gateway terminal, or the paper terminal for dry runs
pub fn build_session(config: &BridgeConfig, paper: bool) -> error::Result<TerminalSession> {
    let terminal: Arc<dyn Terminal> = if paper {
        tracing::info!("Using paper terminal; no orders reach a broker");
        Arc::new(PaperTerminal::with_forex_majors())
    } else {
        Arc::new(GatewayTerminal::new(&config.mt5)?)
    };
    Ok(TerminalSession::new(terminal, config.mt5.clone()))
}

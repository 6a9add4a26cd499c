//! Application state management

use crate::config::BridgeConfig;
use crate::signal::NormalizeOptions;
use crate::terminal::{SharedSession, Terminal, TerminalSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared by every HTTP handler
pub struct AppState {
    pub config: BridgeConfig,

    /// Normalizer settings derived from the trading config
    pub normalize: NormalizeOptions,

    /// Terminal session; held for the full duration of each operation
    pub session: SharedSession,

    /// Lock-free mirror of the session's connection flag
    connected: Arc<AtomicBool>,
}

impl AppState {
    /// Wrap an existing session
    pub fn new(config: BridgeConfig, session: TerminalSession) -> Self {
        let connected = session.connected_flag();
        Self {
            normalize: NormalizeOptions::from(&config.trading),
            config,
            session: session.into_shared(),
            connected,
        }
    }

    /// Build a session around `terminal` using the configured account
    pub fn with_terminal(config: BridgeConfig, terminal: Arc<dyn Terminal>) -> Self {
        let session = TerminalSession::new(terminal, config.mt5.clone());
        Self::new(config, session)
    }

    /// Last known connection state, without waiting on in-flight orders
    pub fn is_terminal_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

//! Terminal session: connection bootstrap and lazy reconnect

use super::Terminal;
use crate::config::Mt5Config;
use crate::error::{AppError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pairs whose broker variants are logged after connecting
const COMMON_PAIRS: [&str; 3] = ["EURUSD", "GBPUSD", "USDJPY"];

/// Session shared by request handlers.
///
/// Terminal session state is process-global, so every operation holds the
/// lock from its connection check to its last terminal call.
pub type SharedSession = Arc<tokio::sync::Mutex<TerminalSession>>;

/// Owns the terminal adapter and its connection state
pub struct TerminalSession {
    terminal: Arc<dyn Terminal>,
    config: Mt5Config,
    connected: Arc<AtomicBool>,
}

impl TerminalSession {
    pub fn new(terminal: Arc<dyn Terminal>, config: Mt5Config) -> Self {
        Self {
            terminal,
            config,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn terminal(&self) -> &dyn Terminal {
        self.terminal.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Lock-free view of the connection flag, for health reporting
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Initialize the terminal and log into the configured account
    pub async fn connect(&mut self) -> Result<()> {
        let terminal = self.terminal.as_ref();
        info!("Connecting to MT5 through the {} terminal", terminal.id());

        if !terminal.initialize(&self.config.path).await {
            let err = terminal.last_error().await;
            error!("MT5 initialize() failed. Error code: {}", err);
            return Err(AppError::Connectivity(format!("initialize failed: {}", err)));
        }

        if !terminal
            .login(self.config.account, &self.config.password, &self.config.server)
            .await
        {
            let err = terminal.last_error().await;
            error!("MT5 login failed. Error code: {}", err);
            terminal.shutdown().await;
            return Err(AppError::Connectivity(format!("login failed: {}", err)));
        }

        match terminal.account_info().await {
            Some(account) => info!(
                "Connected to MT5 - Account: {}, Server: {}, Balance: {}, Leverage: 1:{}",
                account.login, account.server, account.balance, account.leverage
            ),
            None => info!("Connected to MT5 but couldn't retrieve account info"),
        }

        let symbols = match terminal.symbols().await {
            Some(symbols) => symbols,
            None => {
                warn!("Failed to list MT5 symbols: {}", terminal.last_error().await);
                Vec::new()
            }
        };
        if symbols.is_empty() {
            warn!("No symbols found in MT5");
        } else {
            info!("Total symbols available: {}", symbols.len());
            for pair in COMMON_PAIRS {
                let matches: Vec<&String> = symbols.iter().filter(|s| s.contains(pair)).collect();
                if !matches.is_empty() {
                    info!("Found {} variations: {:?}", pair, matches);
                }
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Verify the connection, reconnecting once if it was lost
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() && self.terminal.is_alive().await {
            return Ok(());
        }

        warn!("MT5 connection lost, attempting to reconnect...");
        self.connected.store(false, Ordering::SeqCst);
        self.connect().await
    }

    /// Shut the terminal connection down
    pub async fn close(&mut self) {
        if self.is_connected() {
            self.terminal.shutdown().await;
            self.connected.store(false, Ordering::SeqCst);
            info!("MT5 connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::paper::PaperTerminal;

    fn session_with(paper: &Arc<PaperTerminal>) -> TerminalSession {
        TerminalSession::new(paper.clone(), Mt5Config::default())
    }

    #[tokio::test]
    async fn test_connect_marks_session_connected() {
        let paper = Arc::new(PaperTerminal::with_forex_majors());
        let mut session = session_with(&paper);

        assert!(!session.is_connected());
        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert!(session.connected_flag().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_login_failure_shuts_terminal_down() {
        let paper = Arc::new(PaperTerminal::with_forex_majors());
        paper.reject_logins(true);
        let mut session = session_with(&paper);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, AppError::Connectivity(_)));
        assert!(!session.is_connected());
        assert!(!paper.is_initialized());
    }

    #[tokio::test]
    async fn test_ensure_connected_reconnects_once() {
        let paper = Arc::new(PaperTerminal::with_forex_majors());
        let mut session = session_with(&paper);
        session.connect().await.unwrap();

        paper.drop_connection();
        session.ensure_connected().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(paper.login_count(), 2);
    }

    #[tokio::test]
    async fn test_ensure_connected_fails_when_unreachable() {
        let paper = Arc::new(PaperTerminal::with_forex_majors());
        paper.set_reachable(false);
        let mut session = session_with(&paper);

        assert!(session.ensure_connected().await.is_err());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_close_disconnects() {
        let paper = Arc::new(PaperTerminal::with_forex_majors());
        let mut session = session_with(&paper);
        session.connect().await.unwrap();

        session.close().await;
        assert!(!session.is_connected());
        assert!(!paper.is_initialized());
    }
}

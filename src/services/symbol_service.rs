//! Symbol Service
//!
//! Lists the symbols offered by the connected terminal.

use crate::error::{AppError, Result};
use crate::terminal::TerminalSession;
use tracing::{error, info};

/// Symbol service for business logic
pub struct SymbolService;

impl SymbolService {
    /// All symbol names, filtered by a case-insensitive substring when
    /// `query` is non-empty
    pub async fn search_symbols(
        session: &mut TerminalSession,
        query: Option<&str>,
    ) -> Result<Vec<String>> {
        info!("SymbolService::search_symbols - query={:?}", query);

        session.ensure_connected().await?;
        let terminal = session.terminal();

        let Some(symbols) = terminal.symbols().await else {
            let err = terminal.last_error().await;
            error!("Failed to get symbols: {}", err);
            return Err(AppError::order(format!("Failed to get symbols. Error: {}", err)));
        };

        Ok(filter_symbols(symbols, query.unwrap_or_default()))
    }
}

/// Keep names containing `query`, ignoring case
pub fn filter_symbols(symbols: Vec<String>, query: &str) -> Vec<String> {
    let query = query.trim().to_uppercase();
    if query.is_empty() {
        return symbols;
    }
    symbols
        .into_iter()
        .filter(|s| s.to_uppercase().contains(&query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mt5Config;
    use crate::terminal::paper::PaperTerminal;
    use std::sync::Arc;

    #[test]
    fn test_filter_is_case_insensitive() {
        let symbols = vec!["EURUSD.r".to_string(), "EURGBP.r".to_string(), "USDJPY.r".to_string()];

        assert_eq!(filter_symbols(symbols.clone(), "eur").len(), 2);
        assert_eq!(filter_symbols(symbols.clone(), "jpy"), vec!["USDJPY.r".to_string()]);
        assert_eq!(filter_symbols(symbols.clone(), "").len(), 3);
        assert!(filter_symbols(symbols, "XAU").is_empty());
    }

    #[tokio::test]
    async fn test_search_symbols_from_terminal() {
        let paper = Arc::new(PaperTerminal::with_forex_majors());
        let mut session = TerminalSession::new(paper, Mt5Config::default());

        let usd = SymbolService::search_symbols(&mut session, Some("usd")).await.unwrap();
        assert_eq!(usd.len(), 5);

        let all = SymbolService::search_symbols(&mut session, None).await.unwrap();
        assert_eq!(all.len(), 5);
    }
}

//! Position Service
//!
//! Handles position retrieval and closing. Symbols are reported without
//! the broker suffix, the same form alerts use.

use crate::config::TradingConfig;
use crate::error::{AppError, Result};
use crate::services::order_service::{resolve_broker_symbol, OrderService};
use crate::terminal::types::{
    BrokerDetails, OrderFilling, OrderRequest, OrderTime, OrderType, PositionFilter,
    PositionRecord, TradeAction,
};
use crate::terminal::TerminalSession;
use serde::Serialize;
use tracing::{error, info};

/// Open position as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub record: PositionRecord,
    /// Raw terminal symbol, present when a suffix was stripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_symbol: Option<String>,
}

impl PositionView {
    pub fn from_record(mut record: PositionRecord, suffix: &str) -> Self {
        let broker_symbol = if !suffix.is_empty() && record.symbol.ends_with(suffix) {
            let raw = record.symbol.clone();
            record.symbol.truncate(raw.len() - suffix.len());
            Some(raw)
        } else {
            None
        };
        Self {
            record,
            broker_symbol,
        }
    }
}

/// Result of closing a position
#[derive(Debug, Clone, Serialize)]
pub struct ClosePositionResult {
    pub success: bool,
    pub message: String,
    pub details: BrokerDetails,
}

/// Position service for business logic
pub struct PositionService;

impl PositionService {
    /// Get open positions, optionally for one symbol
    pub async fn get_positions(
        session: &mut TerminalSession,
        symbol: Option<&str>,
        config: &TradingConfig,
    ) -> Result<Vec<PositionView>> {
        info!("PositionService::get_positions - {:?}", symbol);

        session.ensure_connected().await?;

        let filter = match symbol.map(str::trim).filter(|s| !s.is_empty()) {
            Some(symbol) => {
                PositionFilter::Symbol(resolve_broker_symbol(symbol, &config.symbol_suffix))
            }
            None => PositionFilter::All,
        };

        let terminal = session.terminal();
        let Some(positions) = terminal.positions(&filter).await else {
            let err = terminal.last_error().await;
            error!("Failed to get positions: {}", err);
            return Err(AppError::order(format!("Failed to get positions. Error: {}", err)));
        };

        Ok(positions
            .into_iter()
            .map(|p| PositionView::from_record(p, &config.symbol_suffix))
            .collect())
    }

    /// Close a position by ticket with an opposite market deal
    pub async fn close_position(
        session: &mut TerminalSession,
        ticket: u64,
        config: &TradingConfig,
    ) -> Result<ClosePositionResult> {
        info!("PositionService::close_position - {}", ticket);

        session.ensure_connected().await?;
        let terminal = session.terminal();

        let Some(matches) = terminal.positions(&PositionFilter::Ticket(ticket)).await else {
            let err = terminal.last_error().await;
            error!("Failed to look up position {}: {}", ticket, err);
            return Err(AppError::order(format!(
                "Failed to look up position {}. Error: {}",
                ticket, err
            )));
        };
        let position = matches
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Position {} not found", ticket)))?;

        let tick = terminal.symbol_tick(&position.symbol).await.ok_or_else(|| {
            AppError::order(format!("Failed to get market data for {}", position.symbol))
        })?;

        // A long position is sold at the bid, a short one bought at the ask
        let price = match position.position_type {
            OrderType::Buy => tick.bid,
            OrderType::Sell => tick.ask,
        };

        let request = OrderRequest {
            action: TradeAction::Deal,
            position: Some(ticket),
            symbol: position.symbol.clone(),
            volume: position.volume,
            order_type: position.position_type.opposite(),
            price,
            sl: 0.0,
            tp: 0.0,
            deviation: config.deviation,
            magic: config.magic,
            comment: "Close position".to_string(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Ioc,
        };

        info!("Closing position {}", ticket);
        let details = OrderService::send(terminal, &request, "Close position failed").await?;
        info!("Position {} closed successfully. Details: {:?}", ticket, details);

        Ok(ClosePositionResult {
            success: true,
            message: format!("Position {} closed", ticket),
            details,
        })
    }
}

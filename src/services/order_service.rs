//! Order Service
//!
//! Builds market orders from normalized alerts and submits them to the
//! terminal. Handles broker symbol suffixes and converts stop-loss /
//! take-profit distances (in points) into absolute prices.

use crate::config::TradingConfig;
use crate::error::{AppError, Result};
use crate::signal::{Side, TradeIntent};
use crate::terminal::types::{
    BrokerDetails, OrderFilling, OrderRequest, OrderTime, OrderType, Tick, TradeAction,
};
use crate::terminal::{Terminal, TerminalSession};
use serde::Serialize;
use tracing::{error, info};

/// Result of a successfully executed order
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResult {
    pub success: bool,
    pub message: String,
    pub side: Side,
    /// Symbol as the alert named it (no broker suffix)
    pub symbol: String,
    /// Raw terminal result, plus `broker_symbol` when a suffix was applied
    pub details: BrokerDetails,
}

/// Execution price with absolute protective levels (0 = not set)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveLevels {
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl ProtectiveLevels {
    /// Price a market order for `side`.
    ///
    /// BUY fills at the ask with the stop below and the target above; SELL
    /// fills at the bid with the stop above and the target below. A
    /// distance of 0 points leaves that level unset. A positive
    /// `requested_price` replaces the quote as the execution price.
    pub fn compute(
        side: Side,
        tick: &Tick,
        point: f64,
        requested_price: f64,
        stop_loss_points: f64,
        take_profit_points: f64,
    ) -> Self {
        let (market, direction) = match side {
            Side::Buy => (tick.ask, 1.0),
            Side::Sell => (tick.bid, -1.0),
        };
        let price = if requested_price > 0.0 { requested_price } else { market };

        let stop_loss = if stop_loss_points > 0.0 {
            price - direction * stop_loss_points * point
        } else {
            0.0
        };
        let take_profit = if take_profit_points > 0.0 {
            price + direction * take_profit_points * point
        } else {
            0.0
        };

        Self {
            price,
            stop_loss,
            take_profit,
        }
    }

    /// Round every set level to the instrument's precision. Unknown
    /// precision leaves the levels as computed.
    pub fn normalized(self, digits: Option<u32>) -> Self {
        let Some(digits) = digits else {
            return self;
        };
        let scale = 10f64.powi(digits as i32);
        let round = |value: f64| {
            if value == 0.0 {
                0.0
            } else {
                (value * scale).round() / scale
            }
        };
        Self {
            price: round(self.price),
            stop_loss: round(self.stop_loss),
            take_profit: round(self.take_profit),
        }
    }
}

/// Symbol as the broker names it: the configured suffix is appended
/// unless already present
pub fn resolve_broker_symbol(symbol: &str, suffix: &str) -> String {
    if !suffix.is_empty() && !symbol.ends_with(suffix) {
        format!("{}{}", symbol, suffix)
    } else {
        symbol.to_string()
    }
}

impl From<Side> for OrderType {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => OrderType::Buy,
            Side::Sell => OrderType::Sell,
        }
    }
}

/// Order service for business logic
pub struct OrderService;

impl OrderService {
    /// Place a market order for a normalized alert
    pub async fn place_order(
        session: &mut TerminalSession,
        intent: &TradeIntent,
        config: &TradingConfig,
    ) -> Result<PlaceOrderResult> {
        info!("OrderService::place_order - {:?}", intent);

        session.ensure_connected().await?;
        let terminal = session.terminal();

        let broker_symbol = resolve_broker_symbol(&intent.symbol, &config.symbol_suffix);
        if broker_symbol != intent.symbol {
            info!("Adding suffix: {} -> {}", intent.symbol, broker_symbol);
        }
        info!("Trading symbol: {}", broker_symbol);

        let symbol_info = match terminal.symbol_info(&broker_symbol).await {
            Some(info) => info,
            None => {
                let similar = Self::similar_symbols(terminal, &intent.symbol).await;
                error!("Symbol {} not found. Similar symbols: {:?}", broker_symbol, similar);
                return Err(AppError::order(format!("Symbol {} not found", broker_symbol)));
            }
        };

        if !symbol_info.visible {
            info!("Symbol {} is not visible, trying to add it", broker_symbol);
            if !terminal.symbol_select(&broker_symbol).await {
                return Err(AppError::order(format!("Failed to select symbol {}", broker_symbol)));
            }
        }

        let tick = terminal.symbol_tick(&broker_symbol).await.ok_or_else(|| {
            AppError::order(format!("Failed to get market data for {}", broker_symbol))
        })?;
        info!("Current {} prices - Bid: {}, Ask: {}", broker_symbol, tick.bid, tick.ask);

        let levels = ProtectiveLevels::compute(
            intent.side,
            &tick,
            symbol_info.point,
            intent.price,
            intent.stop_loss_points,
            intent.take_profit_points,
        )
        .normalized(symbol_info.digits);

        let request = OrderRequest {
            action: TradeAction::Deal,
            position: None,
            symbol: broker_symbol.clone(),
            volume: intent.volume,
            order_type: intent.side.into(),
            price: levels.price,
            sl: levels.stop_loss,
            tp: levels.take_profit,
            deviation: config.deviation,
            magic: config.magic,
            comment: intent.comment.clone(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Ioc,
        };

        let mut details = Self::send(terminal, &request, "Order failed").await?;
        if broker_symbol != intent.symbol {
            details = details.with_broker_symbol(&broker_symbol);
        }
        info!("Order executed successfully. Details: {:?}", details);

        Ok(PlaceOrderResult {
            success: true,
            message: format!("Order executed: {} {}", intent.side, intent.symbol),
            side: intent.side,
            symbol: intent.symbol.clone(),
            details,
        })
    }

    /// Submit a request and require TRADE_RETCODE_DONE.
    ///
    /// `failure` prefixes the error message ("Order failed",
    /// "Close position failed"). The return code is passed through as is.
    pub(crate) async fn send(
        terminal: &dyn Terminal,
        request: &OrderRequest,
        failure: &str,
    ) -> Result<BrokerDetails> {
        info!("Sending order: {:?}", request);

        let Some(result) = terminal.order_send(request).await else {
            let err = terminal.last_error().await;
            error!("{} with error code: {}", failure, err);
            return Err(AppError::order(format!("{}. Error: {}", failure, err)));
        };

        let details = result.to_details();
        if !result.is_done() {
            error!("{}. Details: {:?}", failure, details);
            return Err(AppError::Order {
                message: format!("{}. Error code: {}", failure, result.retcode),
                retcode: Some(result.retcode),
                details: Some(details),
            });
        }

        Ok(details)
    }

    /// Terminal symbols sharing the base name (text before the first '.')
    async fn similar_symbols(terminal: &dyn Terminal, symbol: &str) -> Vec<String> {
        let base = symbol.split('.').next().unwrap_or(symbol);
        terminal
            .symbols()
            .await
            .into_iter()
            .flatten()
            .filter(|name| name.contains(base))
            .collect()
    }
}

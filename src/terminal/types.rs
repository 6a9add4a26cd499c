//! MT5 terminal wire types
//!
//! Field names follow the MetaTrader 5 API so that records read from the
//! terminal can be handed to HTTP callers unchanged. Enumerations are
//! serialized as the terminal's integer constants.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Return code for a completed trade request
pub const TRADE_RETCODE_DONE: u32 = 10009;

/// Trade request action (TRADE_ACTION_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TradeAction {
    /// Market order for immediate execution
    Deal = 1,
}

impl From<TradeAction> for u8 {
    fn from(value: TradeAction) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for TradeAction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TradeAction::Deal),
            other => Err(format!("unsupported trade action {}", other)),
        }
    }
}

/// Order direction (ORDER_TYPE_BUY / ORDER_TYPE_SELL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderType {
    Buy = 0,
    Sell = 1,
}

impl OrderType {
    /// The order type that closes a position opened with `self`
    pub fn opposite(self) -> Self {
        match self {
            OrderType::Buy => OrderType::Sell,
            OrderType::Sell => OrderType::Buy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderType::Buy => "Buy",
            OrderType::Sell => "Sell",
        }
    }
}

impl From<OrderType> for u8 {
    fn from(value: OrderType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OrderType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderType::Buy),
            1 => Ok(OrderType::Sell),
            other => Err(format!("unsupported order type {}", other)),
        }
    }
}

/// Order lifetime (ORDER_TIME_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderTime {
    /// Good till cancelled
    Gtc = 0,
}

impl From<OrderTime> for u8 {
    fn from(value: OrderTime) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OrderTime {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderTime::Gtc),
            other => Err(format!("unsupported order time {}", other)),
        }
    }
}

/// Fill policy (ORDER_FILLING_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OrderFilling {
    /// Immediate or cancel
    Ioc = 1,
}

impl From<OrderFilling> for u8 {
    fn from(value: OrderFilling) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OrderFilling {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderFilling::Ioc),
            other => Err(format!("unsupported filling mode {}", other)),
        }
    }
}

/// Trade request sent to the terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub action: TradeAction,
    /// Ticket of the position being closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    pub symbol: String,
    pub volume: f64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub price: f64,
    /// Absolute stop-loss price, 0 = none
    #[serde(default)]
    pub sl: f64,
    /// Absolute take-profit price, 0 = none
    #[serde(default)]
    pub tp: f64,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    pub type_time: OrderTime,
    pub type_filling: OrderFilling,
}

/// Result of `order_send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSendResult {
    pub retcode: u32,
    #[serde(default)]
    pub deal: u64,
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub request_id: u64,
    #[serde(default)]
    pub retcode_external: i64,
}

impl OrderSendResult {
    pub fn is_done(&self) -> bool {
        self.retcode == TRADE_RETCODE_DONE
    }

    /// Raw field dump for callers
    pub fn to_details(&self) -> BrokerDetails {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => BrokerDetails(map),
            _ => BrokerDetails::default(),
        }
    }
}

/// Opaque broker response fields passed through to HTTP callers.
///
/// Keys are the terminal's own field names. Documented optional keys:
/// `retcode` (terminal return code) and `broker_symbol` (the suffixed
/// symbol actually traded, present only when it differs from the
/// caller's symbol).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerDetails(Map<String, Value>);

impl BrokerDetails {
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn retcode(&self) -> Option<u32> {
        self.0
            .get("retcode")
            .and_then(Value::as_u64)
            .and_then(|code| u32::try_from(code).ok())
    }

    pub fn broker_symbol(&self) -> Option<&str> {
        self.0.get("broker_symbol").and_then(Value::as_str)
    }

    pub fn with_broker_symbol(mut self, symbol: &str) -> Self {
        self.insert("broker_symbol", Value::String(symbol.to_string()));
        self
    }
}

/// Instrument specification (subset of `symbol_info`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    /// Minimum price increment
    pub point: f64,
    /// Decimal places of quotes; `None` when the terminal did not say
    #[serde(default)]
    pub digits: Option<u32>,
    /// Shown in Market Watch
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub description: String,
}

/// Last quote for a symbol (`symbol_info_tick`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    #[serde(default)]
    pub time: i64,
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub last: f64,
}

/// Open position as reported by `positions_get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: u64,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub time_update: i64,
    #[serde(rename = "type")]
    pub position_type: OrderType,
    #[serde(default)]
    pub magic: u64,
    #[serde(default)]
    pub identifier: u64,
    pub volume: f64,
    pub price_open: f64,
    #[serde(default)]
    pub sl: f64,
    #[serde(default)]
    pub tp: f64,
    #[serde(default)]
    pub price_current: f64,
    #[serde(default)]
    pub swap: f64,
    #[serde(default)]
    pub profit: f64,
    pub symbol: String,
    #[serde(default)]
    pub comment: String,
}

/// Position lookup criteria for `positions_get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionFilter {
    All,
    Symbol(String),
    Ticket(u64),
}

/// Trading account summary (`account_info`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    #[serde(default)]
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub currency: String,
    pub balance: f64,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub margin_free: f64,
    pub leverage: u32,
}

/// One M1 bar from `copy_rates_from_pos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Some brokers report `volume`, most report `tick_volume`
    #[serde(default, alias = "volume")]
    pub tick_volume: u64,
}

/// Terminal-side error (`last_error`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalError {
    pub code: i64,
    pub message: String,
}

impl TerminalError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(1, "Success")
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, '{}')", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_request_uses_terminal_field_names() {
        let request = OrderRequest {
            action: TradeAction::Deal,
            position: None,
            symbol: "EURUSD.r".to_string(),
            volume: 0.01,
            order_type: OrderType::Sell,
            price: 1.1,
            sl: 1.11,
            tp: 1.08,
            deviation: 30,
            magic: 234000,
            comment: "TradingView Signal".to_string(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Ioc,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], json!(1));
        assert_eq!(value["type"], json!(1));
        assert_eq!(value["type_time"], json!(0));
        assert_eq!(value["type_filling"], json!(1));
        assert!(value.get("position").is_none());
    }

    #[test]
    fn test_unknown_order_type_is_rejected() {
        let err = serde_json::from_value::<OrderType>(json!(7));
        assert!(err.is_err());
        assert_eq!(OrderType::Buy.opposite(), OrderType::Sell);
    }

    #[test]
    fn test_send_result_details() {
        let result = OrderSendResult {
            retcode: TRADE_RETCODE_DONE,
            deal: 11,
            order: 12,
            volume: 0.01,
            price: 1.1002,
            bid: 1.1,
            ask: 1.1002,
            comment: "Request executed".to_string(),
            request_id: 3,
            retcode_external: 0,
        };

        assert!(result.is_done());
        let details = result.to_details().with_broker_symbol("EURUSD.r");
        assert_eq!(details.retcode(), Some(TRADE_RETCODE_DONE));
        assert_eq!(details.broker_symbol(), Some("EURUSD.r"));
        assert_eq!(details.get("order"), Some(&json!(12)));
    }

    #[test]
    fn test_rate_bar_accepts_real_volume_name() {
        let bar: RateBar = serde_json::from_value(json!({
            "time": 1, "open": 1.0, "high": 1.2, "low": 0.9, "close": 1.1, "volume": 42
        }))
        .unwrap();
        assert_eq!(bar.tick_volume, 42);
    }
}

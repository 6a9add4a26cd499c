//! Trade signal normalization
//!
//! Turns a raw alert payload (TradingView webhook JSON) into a
//! [`TradeIntent`]. Pure: no terminal access, no side effects.
//!
//! Accepted payload:
//!
//! ```json
//! {"symbol": "EURUSD", "side": "buy", "volume": 0.1,
//!  "price": 0, "stop_loss": 100, "take_profit": 200, "comment": "..."}
//! ```
//!
//! Numeric fields may be JSON numbers or numeric strings; an absent or
//! `null` field takes its default.

use crate::config::TradingConfig;
use crate::error::{AppError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Trade direction after normalization (LONG = BUY, SHORT = SELL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse an alert side, case-insensitively. Surrounding whitespace
    /// is not accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "BUY" | "LONG" => Some(Side::Buy),
            "SELL" | "SHORT" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated alert, ready for order construction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeIntent {
    /// Symbol without the broker suffix
    pub symbol: String,
    pub side: Side,
    /// Lots, always > 0
    pub volume: f64,
    /// Requested price, 0 = current market price
    pub price: f64,
    /// Stop-loss distance in points, 0 = no stop
    pub stop_loss_points: f64,
    /// Take-profit distance in points, 0 = no target
    pub take_profit_points: f64,
    pub comment: String,
}

/// Defaults and broker conventions applied during normalization
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub symbol_suffix: String,
    pub default_volume: f64,
    pub default_stop_loss: f64,
    pub default_take_profit: f64,
    pub default_comment: String,
    pub max_comment_len: Option<usize>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::from(&TradingConfig::default())
    }
}

impl From<&TradingConfig> for NormalizeOptions {
    fn from(config: &TradingConfig) -> Self {
        Self {
            symbol_suffix: config.symbol_suffix.clone(),
            default_volume: config.default_volume,
            default_stop_loss: config.default_stop_loss,
            default_take_profit: config.default_take_profit,
            default_comment: config.default_comment.clone(),
            max_comment_len: config.max_comment_len,
        }
    }
}

/// Remove a trailing broker suffix, if present
pub fn strip_suffix<'a>(symbol: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return symbol;
    }
    symbol.strip_suffix(suffix).unwrap_or(symbol)
}

/// Validate and canonicalize a raw alert payload
pub fn normalize(raw: &Value, options: &NormalizeOptions) -> Result<TradeIntent> {
    let fields = raw
        .as_object()
        .ok_or_else(|| AppError::Validation("Alert payload must be a JSON object".to_string()))?;

    let symbol = required(fields, "symbol")?;
    let side_raw = required(fields, "side")?;

    let symbol = strip_suffix(&stringify(symbol), &options.symbol_suffix).to_string();
    if symbol.trim().is_empty() {
        return Err(AppError::Validation("Missing required field: symbol".to_string()));
    }

    let side_text = stringify(side_raw).to_uppercase();

    let volume = number_or(fields, "volume", options.default_volume)?;
    let price = number_or(fields, "price", 0.0)?;
    let stop_loss_points = number_or(fields, "stop_loss", options.default_stop_loss)?;
    let take_profit_points = number_or(fields, "take_profit", options.default_take_profit)?;

    let comment = match fields.get("comment") {
        None | Some(Value::Null) => options.default_comment.clone(),
        Some(value) => stringify(value),
    };

    if volume <= 0.0 {
        return Err(AppError::Validation(format!("Invalid volume: {}", volume)));
    }

    let side = Side::parse(&side_text)
        .ok_or_else(|| AppError::Validation(format!("Invalid side: {}", side_text)))?;

    if price < 0.0 {
        return Err(AppError::Validation(format!("Invalid price: {}", price)));
    }

    if let Some(max) = options.max_comment_len {
        let len = comment.chars().count();
        if len > max {
            return Err(AppError::Validation(format!(
                "Invalid comment: {} characters exceeds limit of {}",
                len, max
            )));
        }
    }

    Ok(TradeIntent {
        symbol,
        side,
        volume,
        price,
        stop_loss_points,
        take_profit_points,
        comment,
    })
}

fn required<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(AppError::Validation(format!(
            "Missing required field: {}",
            key
        ))),
        Some(value) => Ok(value),
    }
}

/// String form of a JSON value; strings are taken without quotes
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read a float field that may be a number or a numeric string
fn number_or(fields: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    let invalid =
        |shown: &dyn fmt::Display| AppError::Validation(format!("Invalid {}: {}", key, shown));

    let number = match fields.get(key) {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(n))?,
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(s))?,
        Some(other) => return Err(invalid(other)),
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(invalid(&number))
    }
}

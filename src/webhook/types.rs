//! HTTP request and response types
//!
//! Wire shapes of the TradingView bridge endpoints. Every body carries a
//! `success` flag except `/health`, which reports `status`.

use crate::services::{ClosePositionResult, PlaceOrderResult, PositionView};
use crate::terminal::types::BrokerDetails;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response to an order placement or position close
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub message: String,
    pub details: BrokerDetails,
}

impl From<PlaceOrderResult> for OrderResponse {
    fn from(result: PlaceOrderResult) -> Self {
        Self {
            success: result.success,
            message: result.message,
            details: result.details,
        }
    }
}

impl From<ClosePositionResult> for OrderResponse {
    fn from(result: ClosePositionResult) -> Self {
        Self {
            success: result.success,
            message: result.message,
            details: result.details,
        }
    }
}

/// GET /positions query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionsQuery {
    pub symbol: Option<String>,
}

/// GET /positions response
#[derive(Debug, Clone, Serialize)]
pub struct PositionsResponse {
    pub success: bool,
    pub positions: Vec<PositionView>,
    pub count: usize,
}

/// GET /symbols query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymbolsQuery {
    pub q: Option<String>,
}

/// GET /symbols response
#[derive(Debug, Clone, Serialize)]
pub struct SymbolsResponse {
    pub success: bool,
    pub count: usize,
    pub symbols: Vec<String>,
}

/// GET /health response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub mt5_connected: bool,
    pub timestamp: String,
}

/// GET / response
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub mt5_connected: bool,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

impl InfoResponse {
    pub fn new(mt5_connected: bool) -> Self {
        let endpoints = BTreeMap::from([
            ("/", "This information page (GET)"),
            ("/trade", "Endpoint for TradingView alerts (POST)"),
            ("/health", "Health check endpoint (GET)"),
            ("/positions", "List open positions (GET)"),
            ("/position/<id>/close", "Close a specific position (POST)"),
            ("/symbols", "List available symbols (GET)"),
            ("/symbols?q=EUR", "Search for symbols (GET)"),
        ]);

        Self {
            name: "TradingView to MT5 Integration",
            version: env!("CARGO_PKG_VERSION"),
            status: "running",
            mt5_connected,
            endpoints,
        }
    }
}

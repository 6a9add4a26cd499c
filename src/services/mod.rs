//! Services Layer
//!
//! Business logic behind the HTTP handlers. Each service works on an
//! exclusively held [`TerminalSession`](crate::terminal::TerminalSession)
//! and verifies the connection before touching the terminal.
//!
//! # Architecture
//!
//! ```text
//! TradingView alert --> handler --> signal::normalize --+
//!                                                       +--> Services --> Terminal
//! REST caller ------> handler --------------------------+
//! ```
//!
//! # Services
//!
//! - `OrderService` - Build and place market orders from alerts
//! - `PositionService` - List positions, close a position
//! - `SymbolService` - Symbol listing and search

pub mod order_service;
pub mod position_service;
pub mod symbol_service;

pub use order_service::{resolve_broker_symbol, OrderService, PlaceOrderResult, ProtectiveLevels};
pub use position_service::{ClosePositionResult, PositionService, PositionView};
pub use symbol_service::SymbolService;

//! Endpoint handlers
//!
//! - `POST /trade` - TradingView alert webhook
//! - `GET /positions`, `POST /position/{id}/close`
//! - `GET /symbols`, `GET /health`, `GET /`

use crate::error::{AppError, ErrorResponse};
use crate::services::{OrderService, PositionService, SymbolService};
use crate::signal;
use crate::state::AppState;
use crate::webhook::types::*;
use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, Query, State as AxumState},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Info / Health
// ============================================================================

/// Service information - GET /
pub async fn index(AxumState(state): AxumState<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse::new(state.is_terminal_connected()))
}

/// Health check endpoint - GET /health
pub async fn health_check(AxumState(state): AxumState<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        mt5_connected: state.is_terminal_connected(),
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}

// ============================================================================
// Trade webhook
// ============================================================================

/// TradingView alert - POST /trade
pub async fn trade(
    AxumState(state): AxumState<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<OrderResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!("Rejected webhook body: {}", rejection.body_text());
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                AppError::Validation("Request must be JSON".to_string())
            }
            other => AppError::Validation(format!("Invalid JSON payload: {}", other.body_text())),
        }
    })?;
    info!("Received webhook data: {}", payload);

    let intent = signal::normalize(&payload, &state.normalize).map_err(|e| {
        error!("Invalid webhook data: {}", e);
        e
    })?;

    let mut session = state.session.lock().await;
    match OrderService::place_order(&mut session, &intent, &state.config.trading).await {
        Ok(result) => {
            info!("Trade executed successfully: {}", result.message);
            Ok(Json(result.into()))
        }
        Err(e) => {
            error!("Trade execution failed: {}", e);
            Err(e)
        }
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Open positions - GET /positions?symbol=
pub async fn get_positions(
    AxumState(state): AxumState<Arc<AppState>>,
    Query(query): Query<PositionsQuery>,
) -> Result<Json<PositionsResponse>, AppError> {
    let mut session = state.session.lock().await;
    let positions =
        PositionService::get_positions(&mut session, query.symbol.as_deref(), &state.config.trading)
            .await
            .map_err(|e| {
                error!("Error getting positions: {}", e);
                e
            })?;

    Ok(Json(PositionsResponse {
        success: true,
        count: positions.len(),
        positions,
    }))
}

/// Close a position - POST /position/{id}/close
pub async fn close_position(
    AxumState(state): AxumState<Arc<AppState>>,
    position_id: Result<Path<u64>, PathRejection>,
) -> Response {
    // Non-numeric ids do not match the route
    let Ok(Path(position_id)) = position_id else {
        return not_found().await.into_response();
    };

    let mut session = state.session.lock().await;
    match PositionService::close_position(&mut session, position_id, &state.config.trading).await {
        Ok(result) => {
            info!("Position closed successfully: {}", result.message);
            Json(OrderResponse::from(result)).into_response()
        }
        Err(e) => {
            error!("Position close failed: {}", e);
            e.into_response()
        }
    }
}

// ============================================================================
// Symbols
// ============================================================================

/// Available symbols - GET /symbols?q=
pub async fn get_symbols(
    AxumState(state): AxumState<Arc<AppState>>,
    Query(query): Query<SymbolsQuery>,
) -> Result<Json<SymbolsResponse>, AppError> {
    let mut session = state.session.lock().await;
    let symbols = SymbolService::search_symbols(&mut session, query.q.as_deref())
        .await
        .map_err(|e| {
            error!("Error getting symbols: {}", e);
            e
        })?;

    Ok(Json(SymbolsResponse {
        success: true,
        count: symbols.len(),
        symbols,
    }))
}

// ============================================================================
// Error handlers
// ============================================================================

/// Fallback for unknown routes
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Endpoint not found")),
    )
}

/// Replace axum's empty 405 body with the JSON envelope, keeping `Allow`
pub async fn method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let (parts, _) = response.into_parts();
    let mut rewritten = (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new("Method not allowed")),
    )
        .into_response();

    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rewritten.headers_mut().append(name.clone(), value.clone());
        }
    }
    rewritten
}

/// Panic inside a handler
pub fn internal_error(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}

//! HTTP server for the TradingView webhook and position API

use crate::state::AppState;
use crate::webhook::handlers;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

/// Build the router with all routes
pub fn router(state: Arc<AppState>) -> Router {
    // Debug mode logs every request at INFO, otherwise at DEBUG
    let response_level = if state.config.server.debug {
        Level::INFO
    } else {
        Level::DEBUG
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/trade", post(handlers::trade))
        .route("/positions", get(handlers::get_positions))
        .route("/position/:position_id/close", post(handlers::close_position))
        .route("/symbols", get(handlers::get_symbols))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(middleware::map_response(handlers::method_not_allowed))
        .layer(CatchPanicLayer::custom(handlers::internal_error))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_response(DefaultOnResponse::new().level(response_level)),
        )
}

/// Webhook/API server manager
pub struct WebhookServer {
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WebhookServer {
    /// Create a new server
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Bind and start serving in the background. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, String> {
        let host = self.state.config.server.host.clone();
        let port = self.state.config.server.port;

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| format!("Invalid address: {}", e))?;

        let app = router(self.state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        info!("Starting TradingView bridge server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;
        let bound = listener
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        self.task = Some(tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            });

            if let Err(e) = server.await {
                error!("API server error: {}", e);
            }
        }));

        info!("TradingView bridge server started successfully");
        info!("");
        info!("=== Endpoints ===");
        info!("  GET  http://{}/", bound);
        info!("  GET  http://{}/health", bound);
        info!("  POST http://{}/trade", bound);
        info!("  GET  http://{}/positions", bound);
        info!("  POST http://{}/position/{{id}}/close", bound);
        info!("  GET  http://{}/symbols?q=EUR", bound);

        Ok(bound)
    }

    /// Signal shutdown and wait for in-flight requests to finish
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("API server stop signal sent");
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("API server task failed: {}", e);
            }
        }
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

impl Drop for WebhookServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::terminal::gateway::GatewayTerminal;
    use crate::terminal::paper::PaperTerminal;
    use crate::terminal::types::OrderType;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn spec_paper() -> Arc<PaperTerminal> {
        let paper = PaperTerminal::new();
        paper.add_symbol("EURUSD", 0.0001, 4, 1.1, 1.1002);
        paper.add_symbol("EURGBP", 0.00001, 5, 0.85, 0.8502);
        Arc::new(paper)
    }

    fn test_state(paper: &Arc<PaperTerminal>) -> Arc<AppState> {
        Arc::new(AppState::with_terminal(BridgeConfig::default(), paper.clone()))
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_trade_end_to_end() {
        let paper = spec_paper();
        let app = router(test_state(&paper));

        let resp = app
            .oneshot(post_json("/trade", json!({"symbol": "EURUSD", "side": "BUY"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Order executed: BUY EURUSD");
        assert_eq!(body["details"]["retcode"], 10009);
        assert_eq!(body["details"]["price"], 1.1002);

        let sent = paper.sent_orders();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sl, 1.0902);
        assert_eq!(sent[0].tp, 1.1202);
    }

    #[tokio::test]
    async fn test_trade_validation_is_400() {
        let paper = spec_paper();
        let app = router(test_state(&paper));

        let resp = app
            .clone()
            .oneshot(post_json("/trade", json!({"symbol": "EURUSD"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing required field: side");

        let resp = app
            .oneshot(post_json("/trade", json!({"symbol": "EURUSD", "side": "sideways"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(paper.sent_orders().is_empty());
    }

    #[tokio::test]
    async fn test_trade_requires_json() {
        let app = router(test_state(&spec_paper()));

        let req = Request::builder()
            .method("POST")
            .uri("/trade")
            .header("content-type", "text/plain")
            .body(Body::from("buy EURUSD"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "Request must be JSON");
    }

    #[tokio::test]
    async fn test_trade_rejection_is_500_with_details() {
        let paper = spec_paper();
        paper.reject_orders(Some(10019));
        let app = router(test_state(&paper));

        let resp = app
            .oneshot(post_json("/trade", json!({"symbol": "EURUSD", "side": "sell"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Order failed. Error code: 10019");
        assert_eq!(body["details"]["retcode"], 10019);
    }

    #[tokio::test]
    async fn test_trade_when_terminal_unreachable() {
        let paper = spec_paper();
        paper.set_reachable(false);
        let state = test_state(&paper);
        let app = router(state.clone());

        let resp = app
            .oneshot(post_json("/trade", json!({"symbol": "EURUSD", "side": "buy"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["message"], "MT5 connection failed");
        assert!(!state.is_terminal_connected());
    }

    #[tokio::test]
    async fn test_positions_and_close() {
        let paper = spec_paper();
        let ticket = paper.open_position("EURUSD", OrderType::Buy, 0.1, 1.09);
        let app = router(test_state(&paper));

        let resp = app.clone().oneshot(get("/positions")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["positions"][0]["ticket"], ticket);

        let resp = app
            .clone()
            .oneshot(get("/positions?symbol=GBPUSD"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["count"], 0);

        let uri = format!("/position/{}/close", ticket);
        let resp = app.clone().oneshot(post_empty(&uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["message"], format!("Position {} closed", ticket));

        let resp = app
            .oneshot(post_empty("/position/7/close"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["message"], "Position 7 not found");
    }

    #[tokio::test]
    async fn test_non_numeric_position_id_is_404() {
        let app = router(test_state(&spec_paper()));
        let resp = app
            .oneshot(post_empty("/position/abc/close"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["message"], "Endpoint not found");
    }

    #[tokio::test]
    async fn test_symbols_search() {
        let app = router(test_state(&spec_paper()));

        let resp = app.clone().oneshot(get("/symbols?q=gbp")).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["symbols"][0], "EURGBP");

        let resp = app.oneshot(get("/symbols")).await.unwrap();
        assert_eq!(body_json(resp).await["count"], 2);
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let paper = spec_paper();
        let state = test_state(&paper);
        let app = router(state.clone());

        let body = body_json(app.clone().oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mt5_connected"], false);
        assert!(body["timestamp"].is_string());

        state.session.lock().await.connect().await.unwrap();

        let body = body_json(app.oneshot(get("/")).await.unwrap()).await;
        assert_eq!(body["name"], "TradingView to MT5 Integration");
        assert_eq!(body["status"], "running");
        assert_eq!(body["mt5_connected"], true);
        assert!(body["endpoints"]["/trade"].is_string());
    }

    /// Gateway whose session calls succeed but whose list queries fail
    async fn failing_list_gateway() -> Arc<AppState> {
        use axum::extract::Path;
        use axum::Json;

        let gateway = Router::new().route(
            "/:method",
            axum::routing::post(|Path(method): Path<String>| async move {
                let reply = match method.as_str() {
                    "symbols_get" | "positions_get" => json!({
                        "ok": false,
                        "error": { "code": -10005, "message": "IPC timeout" }
                    }),
                    "account_info" => json!({ "ok": true, "result": null }),
                    _ => json!({ "ok": true, "result": {} }),
                };
                Json(reply)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, gateway).await.unwrap();
        });

        let mut config = BridgeConfig::default();
        config.mt5.gateway_url = format!("http://{}", addr);
        let terminal = GatewayTerminal::new(&config.mt5).unwrap();
        Arc::new(AppState::with_terminal(config, Arc::new(terminal)))
    }

    #[tokio::test]
    async fn test_failed_terminal_queries_are_errors() {
        let app = router(failing_list_gateway().await);

        let resp = app.clone().oneshot(get("/positions")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(
            body["message"],
            "Failed to get positions. Error: (-10005, 'IPC timeout')"
        );

        let resp = app.clone().oneshot(get("/symbols?q=eur")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await["message"],
            "Failed to get symbols. Error: (-10005, 'IPC timeout')"
        );

        let resp = app
            .oneshot(post_empty("/position/5/close"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await["message"],
            "Failed to look up position 5. Error: (-10005, 'IPC timeout')"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_and_wrong_method() {
        let app = router(test_state(&spec_paper()));

        let resp = app.clone().oneshot(get("/nope")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["success"], false);

        let resp = app.oneshot(get("/trade")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        let allow = resp.headers().get("allow").unwrap().to_str().unwrap();
        assert!(allow.contains("POST"));
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/json");
        assert_eq!(body_json(resp).await["message"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_server_start_and_stop() {
        let mut config = BridgeConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        let state = Arc::new(AppState::with_terminal(config, spec_paper()));

        let mut server = WebhookServer::new(state);
        let addr = server.start().await.unwrap();
        assert!(server.is_running());
        assert_ne!(addr.port(), 0);

        server.stop().await;
        assert!(!server.is_running());
    }
}

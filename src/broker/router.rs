//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::extract::TokenRequestBody;
use crate::Result;
use crate::oauth::{CodeFlow, TokenExchanger, TokenResponse};

/// Shared application state
pub struct AppState {
    /// Code-for-token exchanger
    pub exchanger: TokenExchanger,
    /// Interactive loopback code flow
    pub code_flow: CodeFlow,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, max_body_size: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/generateToken", post(generate_token_handler))
        // Route name used by earlier clients
        .route("/token", post(generate_token_handler))
        .route("/generateCode", get(generate_code_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /generateToken - exchange an authorization code for a token
async fn generate_token_handler(
    State(state): State<Arc<AppState>>,
    TokenRequestBody(request): TokenRequestBody,
) -> Result<Json<TokenResponse>> {
    let token = state.exchanger.exchange(&request).await?;
    Ok(Json(token))
}

/// GET /generateCode - run the interactive flow and answer with the code
async fn generate_code_handler(State(state): State<Arc<AppState>>) -> Result<String> {
    info!("Starting interactive authorization");
    let captured = state.code_flow.acquire_code(None).await?;
    Ok(captured.code)
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API contract types and server implementation for HTTP and WebSocket transports.

pub mod http;
pub mod state;
pub mod ws;
pub mod ws_chat;
pub mod ws_msg;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: ErrorBody { code: self.code.as_str(), message: self.message } };
        (status, Json(body)).into_response()
    }
}

/// Build the main API router: session lifecycle HTTP routes plus the raw and
/// chat WebSocket upgrade routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions/attach-or-create", post(http::attach_or_create))
        .route("/api/sessions", post(http::create_session_handler).get(http::list_sessions_handler))
        .route("/api/sessions/{id}/attach", post(http::attach_raw_handler))
        .route("/api/sessions/{id}/attach-chat", post(http::attach_chat_handler))
        .route("/api/sessions/{id}/close", post(http::close_session_handler))
        .route("/api/v1/health", get(http::health_handler))
        .route("/ws/sessions/{id}", get(ws::raw_ws_handler))
        .route("/ws/chat/sessions/{id}", get(ws_chat::chat_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Minimal router exposing only `/api/v1/health`, bound to a separate port
/// so liveness checks don't depend on the full session-routing surface.
pub fn build_health_router(state: AppState) -> Router {
    Router::new().route("/api/v1/health", get(http::health_handler)).with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

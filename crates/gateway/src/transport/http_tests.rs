// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::attach_token::AttachTokenRegistry;
use crate::audit::AuditSink;
use crate::auth::NoneAuthenticator;
use crate::config::Config;
use crate::manager::{ManagerPolicy, SessionManager};
use crate::transport::build_router;
use crate::transport::state::AppState;

fn test_state() -> AppState {
    let config = Config::try_parse_from(["shellgate"]).expect("default config parses");
    AppState {
        manager: Arc::new(SessionManager::new(ManagerPolicy {
            max_sessions_per_user: 12,
            detach_grace: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(3600),
        })),
        authenticator: Arc::new(NoneAuthenticator { user_id: "tester".to_owned() }),
        attach_tokens: Arc::new(AttachTokenRegistry::new(Duration::from_secs(60))),
        audit: Arc::new(AuditSink::to_tracing()),
        config: Arc::new(config),
        shutdown: CancellationToken::new(),
    }
}

#[tokio::test]
async fn health_returns_ok() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let resp = server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn create_shell_session_returns_attach_token_and_ws_url() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let resp = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert!(body["sessionId"].is_string());
    assert!(body["attachToken"].is_string());
    assert_eq!(body["wsUrl"], format!("/ws/sessions/{}", body["sessionId"].as_str().unwrap()));
    Ok(())
}

#[tokio::test]
async fn create_session_with_disabled_mode_is_rejected() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let resp = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "node", "cols": 80, "rows": 24}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "MODE_DISABLED");
    Ok(())
}

#[tokio::test]
async fn list_sessions_reflects_created_session() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let created = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await
        .json::<serde_json::Value>();

    let resp = server.get("/api/sessions").await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    let sessions = body["sessions"].as_array().expect("sessions array");
    assert!(sessions.iter().any(|s| s["sessionId"] == created["sessionId"]));
    Ok(())
}

#[tokio::test]
async fn close_session_reports_ok() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let created = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await
        .json::<serde_json::Value>();
    let session_id = created["sessionId"].as_str().expect("sessionId").to_owned();

    let resp = server.post(&format!("/api/sessions/{session_id}/close")).await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["ok"], true);
    Ok(())
}

#[tokio::test]
async fn close_unknown_session_returns_not_found() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let resp = server.post("/api/sessions/does-not-exist/close").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn attach_mints_a_fresh_token_scoped_to_raw_view() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let created = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await
        .json::<serde_json::Value>();
    let session_id = created["sessionId"].as_str().expect("sessionId").to_owned();

    let resp = server.post(&format!("/api/sessions/{session_id}/attach")).json(&serde_json::json!({})).await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["wsUrl"], format!("/ws/sessions/{session_id}"));
    Ok(())
}

#[tokio::test]
async fn attach_chat_mints_a_chat_scoped_token() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state())).map_err(|e| anyhow::anyhow!("{e}"))?;
    let created = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await
        .json::<serde_json::Value>();
    let session_id = created["sessionId"].as_str().expect("sessionId").to_owned();

    let resp = server.post(&format!("/api/sessions/{session_id}/attach-chat")).json(&serde_json::json!({})).await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["wsUrl"], format!("/ws/chat/sessions/{session_id}"));
    Ok(())
}

#[tokio::test]
async fn tmux_session_without_tmux_name_is_a_bad_request() -> anyhow::Result<()> {
    let mut config = Config::try_parse_from(["shellgate"])?;
    config.enable_tmux = true;
    let mut state = test_state();
    state.config = Arc::new(config);

    let server = axum_test::TestServer::new(build_router(state)).map_err(|e| anyhow::anyhow!("{e}"))?;
    let resp = server.post("/api/sessions").json(&serde_json::json!({"mode": "tmux", "cols": 80, "rows": 24})).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

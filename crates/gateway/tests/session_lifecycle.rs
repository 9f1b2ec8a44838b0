// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the session lifecycle HTTP surface, exercising the
//! full stack in-process via `axum_test::TestServer`: create, list, attach,
//! resize, and close, each backed by a real `NativePty`-spawned shell.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use shellgate::attach_token::AttachTokenRegistry;
use shellgate::audit::AuditSink;
use shellgate::auth::NoneAuthenticator;
use shellgate::config::Config;
use shellgate::manager::{ManagerPolicy, SessionManager};
use shellgate::transport::build_router;
use shellgate::transport::state::AppState;

fn test_state(max_sessions_per_user: usize) -> AppState {
    let config = Config::try_parse_from(["shellgate"]).expect("default config parses");
    AppState {
        manager: Arc::new(SessionManager::new(ManagerPolicy {
            max_sessions_per_user,
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
async fn create_list_attach_close_round_trip() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state(12))).map_err(|e| anyhow::anyhow!("{e}"))?;

    let created = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await;
    created.assert_status(StatusCode::OK);
    let created: serde_json::Value = created.json();
    let session_id = created["sessionId"].as_str().expect("sessionId present").to_owned();

    let listed = server.get("/api/sessions").await;
    listed.assert_status(StatusCode::OK);
    let listed: serde_json::Value = listed.json();
    let sessions = listed["sessions"].as_array().expect("sessions array");
    assert!(sessions.iter().any(|s| s["session_id"] == session_id));

    let attached = server
        .post(&format!("/api/sessions/{session_id}/attach"))
        .json(&serde_json::json!({"cols": 100, "rows": 30}))
        .await;
    attached.assert_status(StatusCode::OK);
    let attached: serde_json::Value = attached.json();
    assert_eq!(attached["sessionId"], session_id);
    assert!(attached["attachToken"].is_string());

    let closed = server.post(&format!("/api/sessions/{session_id}/close")).await;
    closed.assert_status(StatusCode::OK);
    let closed: serde_json::Value = closed.json();
    assert_eq!(closed["ok"], true);

    let close_unknown = server.post("/api/sessions/does-not-exist/close").await;
    close_unknown.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn attach_or_create_reuses_session_by_resume_key() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state(12))).map_err(|e| anyhow::anyhow!("{e}"))?;

    let first = server
        .post("/api/sessions/attach-or-create")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24, "resumeKey": "laptop-1"}))
        .await;
    first.assert_status(StatusCode::OK);
    let first: serde_json::Value = first.json();

    let second = server
        .post("/api/sessions/attach-or-create")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24, "resumeKey": "laptop-1"}))
        .await;
    second.assert_status(StatusCode::OK);
    let second: serde_json::Value = second.json();

    assert_eq!(first["sessionId"], second["sessionId"], "same resumeKey must reattach the same session");
    Ok(())
}

#[tokio::test]
async fn per_user_session_cap_is_enforced() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state(1))).map_err(|e| anyhow::anyhow!("{e}"))?;

    let first = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await;
    first.assert_status(StatusCode::OK);

    let second = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "shell", "cols": 80, "rows": 24}))
        .await;
    second.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = second.json();
    assert_eq!(body["error"]["code"], "CAP_EXCEEDED");

    Ok(())
}

#[tokio::test]
async fn readonly_tail_mode_without_path_is_rejected() -> anyhow::Result<()> {
    let server = axum_test::TestServer::new(build_router(test_state(12))).map_err(|e| anyhow::anyhow!("{e}"))?;
    let resp = server
        .post("/api/sessions")
        .json(&serde_json::json!({"mode": "readonly_tail", "cols": 80, "rows": 24}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as TMessage;
use tokio_util::sync::CancellationToken;

use crate::attach_token::AttachTokenRegistry;
use crate::audit::AuditSink;
use crate::auth::NoneAuthenticator;
use crate::config::Config;
use crate::manager::{ManagerPolicy, SessionManager};
use crate::pty::spawn::NativePty;
use crate::session::{Session, SessionConfig, SessionMode, ViewerKind};
use crate::transport::build_router;
use crate::transport::state::AppState;

use clap::Parser;

async fn spawn_server() -> (std::net::SocketAddr, AppState) {
    let config = Config::try_parse_from(["shellgate"]).expect("default config parses");
    let state = AppState {
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
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let router = build_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    (addr, state)
}

async fn spawn_cat_session(state: &AppState) -> String {
    let backend = NativePty::spawn(&["cat".into()], None, 80, 24, &[]).expect("spawn cat");
    let config = SessionConfig::new("sess-chat", "tester", SessionMode::Shell, PathBuf::from("/"), 80, 24, backend);
    let handle = Session::spawn(config);
    state.manager.register(handle, None).await.expect("register");
    "sess-chat".to_owned()
}

async fn recv_json(rx: &mut (impl StreamExt<Item = Result<TMessage, tokio_tungstenite::tungstenite::Error>> + Unpin)) -> serde_json::Value {
    match tokio::time::timeout(Duration::from_secs(2), rx.next()).await {
        Ok(Some(Ok(TMessage::Text(text)))) => serde_json::from_str(&text).expect("valid json"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn chat_websocket_rejects_missing_attach_token() {
    let (addr, _state) = spawn_server().await;
    let url = format!("ws://{addr}/ws/chat/sessions/unknown");
    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_err(), "expected connection without an attachToken query param to be rejected");
}

#[tokio::test]
async fn chat_websocket_rejects_unknown_token() {
    let (addr, _state) = spawn_server().await;
    let url = format!("ws://{addr}/ws/chat/sessions/unknown?attachToken=not-a-real-token");
    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_err(), "expected an unrecognized attach token to be rejected before upgrade");
}

#[tokio::test]
async fn chat_websocket_streams_hello_then_snapshot_ready_then_live_events() {
    let (addr, state) = spawn_server().await;
    let session_id = spawn_cat_session(&state).await;
    let token = state.attach_tokens.issue(&session_id, "tester", ViewerKind::Chat, None);

    let url = format!("ws://{addr}/ws/chat/sessions/{session_id}?attachToken={token}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    let (mut tx, mut rx) = stream.split();

    let hello = recv_json(&mut rx).await;
    assert_eq!(hello["type"], "hello");

    let snapshot_ready = recv_json(&mut rx).await;
    assert_eq!(snapshot_ready["type"], "snapshot_ready");

    tx.send(TMessage::Text(
        serde_json::json!({"type": "user_input", "text": "hello", "enter": true}).to_string().into(),
    ))
    .await
    .expect("send user_input");

    let echoed_input = recv_json(&mut rx).await;
    assert_eq!(echoed_input["type"], "user_input");
    assert_eq!(echoed_input["text"], "hello");

    let stdout_event = loop {
        let event = recv_json(&mut rx).await;
        if event["type"] == "stdout_chunk" {
            break event;
        }
    };
    assert!(stdout_event["text"].as_str().unwrap_or_default().contains("hello"));
}

#[tokio::test]
async fn chat_websocket_resize_updates_session_size() {
    let (addr, state) = spawn_server().await;
    let session_id = spawn_cat_session(&state).await;
    let token = state.attach_tokens.issue(&session_id, "tester", ViewerKind::Chat, None);

    let url = format!("ws://{addr}/ws/chat/sessions/{session_id}?attachToken={token}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    let (mut tx, mut rx) = stream.split();

    let _hello = recv_json(&mut rx).await;
    let _snapshot_ready = recv_json(&mut rx).await;

    tx.send(TMessage::Text(serde_json::json!({"type": "resize", "cols": 120, "rows": 40}).to_string().into()))
        .await
        .expect("send resize");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let handle = state.manager.get(&session_id, "tester").await.expect("session still registered");
    let info = handle.info();
    assert_eq!(info.cols, 120);
    assert_eq!(info.rows, 40);
}

#[tokio::test]
async fn chat_attach_token_is_single_use() {
    let (addr, state) = spawn_server().await;
    let session_id = spawn_cat_session(&state).await;
    let token = state.attach_tokens.issue(&session_id, "tester", ViewerKind::Chat, None);

    let url = format!("ws://{addr}/ws/chat/sessions/{session_id}?attachToken={token}");
    let first = tokio_tungstenite::connect_async(&url).await;
    assert!(first.is_ok(), "first redemption should succeed");

    let second = tokio_tungstenite::connect_async(&url).await;
    assert!(second.is_err(), "replayed attach token must be rejected");
}

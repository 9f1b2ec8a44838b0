// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw-view WebSocket gateway: `/ws/sessions/{id}`. The attach token is
//! carried as the `Sec-WebSocket-Protocol` value rather than the URL, since
//! the raw view is the one most likely to be proxied by tools (like
//! xterm.js's `attach` addon) that don't attach query strings.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};

use crate::audit::AuditRecord;
use crate::error::{ErrorCode, GatewayError, WsCloseCode};
use crate::session::{SessionHandle, ViewerKind};

use super::state::AppState;
use super::ws_msg::{RawClientMessage, RawServerMessage};

fn requested_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("sec-websocket-protocol")?.to_str().ok()?;
    raw.split(',').next().map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

pub async fn raw_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = match requested_token(&headers) {
        Some(t) => t,
        None => return GatewayError::new(ErrorCode::AuthError, "missing attach token").into_response(),
    };

    let binding = match state.attach_tokens.consume(&token) {
        Some(b) => b,
        None => return GatewayError::new(ErrorCode::AuthError, "invalid or expired attach token").into_response(),
    };
    if binding.session_id != session_id || binding.view_kind != ViewerKind::Raw {
        return GatewayError::new(ErrorCode::AuthError, "attach token does not match this session/view").into_response();
    }

    let handle = match state.manager.get(&session_id, &binding.user_id).await {
        Ok(h) => h,
        Err(code) => return GatewayError::new(code, "session not found").into_response(),
    };

    if let (Some(cols), Some(rows)) = (binding.cols, binding.rows) {
        let _ = handle.resize(cols, rows).await;
    }

    let user_id = binding.user_id.clone();
    ws.protocols([token])
        .max_message_size(state.config.max_ws_message_bytes)
        .on_upgrade(move |socket| handle_raw_connection(socket, state, handle, user_id))
}

async fn handle_raw_connection(socket: WebSocket, state: AppState, handle: SessionHandle, user_id: String) {
    let session_id = handle.session_id().to_owned();
    let attachment = match handle.attach_raw().await {
        Ok(a) => a,
        Err(_) => return,
    };
    state.audit.record(AuditRecord::new("session_attach").user(&user_id).session(&session_id));

    let (mut sender, mut receiver) = socket.split();

    let snapshot_msg = RawServerMessage::Snapshot { data: base64::engine::general_purpose::STANDARD.encode(&attachment.snapshot) };
    if send_json(&mut sender, &snapshot_msg).await.is_err() {
        handle.detach(attachment.viewer_id, ViewerKind::Raw).await;
        return;
    }

    let mut rx = attachment.rx;
    loop {
        tokio::select! {
            data = rx.recv() => {
                match data {
                    Some(bytes) => {
                        if sender.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = send_json(&mut sender, &RawServerMessage::Exit { exit_code: None, signal: None }).await;
                        break;
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        if handle.write(Bytes::from(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<RawClientMessage>(&text) {
                            Ok(RawClientMessage::Resize { cols, rows }) => {
                                let _ = handle.resize(cols, rows).await;
                            }
                            Ok(RawClientMessage::Ping) => {
                                if send_json(&mut sender, &RawServerMessage::Pong).await.is_err() {
                                    break;
                                }
                            }
                            Ok(RawClientMessage::Hello) => {}
                            Err(_) => break,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => {
                        let frame = CloseFrame {
                            code: WsCloseCode::MessageTooBig as u16,
                            reason: "message exceeds maxWsMessageBytes".into(),
                        };
                        let _ = sender.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        }
    }

    handle.detach(attachment.viewer_id, ViewerKind::Raw).await;
    state.audit.record(AuditRecord::new("session_detach").user(&user_id).session(&session_id));
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &RawServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;

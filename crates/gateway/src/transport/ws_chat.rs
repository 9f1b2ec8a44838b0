// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat-view WebSocket gateway: `/ws/chat/sessions/{id}`. Unlike the raw
//! view, the attach token and `afterSeq` resume marker are carried in the
//! query string — this view is consumed by a browser UI making a normal
//! `new WebSocket(url)` call, where a subprotocol is awkward to set.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::audit::AuditRecord;
use crate::error::{ErrorCode, GatewayError, WsCloseCode};
use crate::event::ChatEvent;
use crate::session::{SessionHandle, ViewerKind};

use super::state::AppState;
use super::ws_msg::ChatClientMessage;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub attach_token: String,
    #[serde(default)]
    pub after_seq: Option<u64>,
}

pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<ChatQuery>,
    State(state): State<AppState>,
) -> Response {
    let binding = match state.attach_tokens.consume(&query.attach_token) {
        Some(b) => b,
        None => return GatewayError::new(ErrorCode::AuthError, "invalid or expired attach token").into_response(),
    };
    if binding.session_id != session_id || binding.view_kind != ViewerKind::Chat {
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
    let after_seq = query.after_seq;
    ws.max_message_size(state.config.max_ws_message_bytes)
        .on_upgrade(move |socket| handle_chat_connection(socket, state, handle, user_id, after_seq))
}

async fn handle_chat_connection(
    socket: WebSocket,
    state: AppState,
    handle: SessionHandle,
    user_id: String,
    after_seq: Option<u64>,
) {
    let session_id = handle.session_id().to_owned();
    let attachment = match handle.attach_chat(after_seq).await {
        Ok(a) => a,
        Err(_) => return,
    };
    state.audit.record(AuditRecord::new("chat_attach").user(&user_id).session(&session_id));

    let (mut sender, mut receiver) = socket.split();

    if send_json(&mut sender, &attachment.hello).await.is_err() {
        handle.detach(attachment.viewer_id, ViewerKind::Chat).await;
        return;
    }
    for event in &attachment.replay {
        if send_json(&mut sender, event).await.is_err() {
            handle.detach(attachment.viewer_id, ViewerKind::Chat).await;
            return;
        }
    }
    if send_json(&mut sender, &attachment.snapshot_ready).await.is_err() {
        handle.detach(attachment.viewer_id, ViewerKind::Chat).await;
        return;
    }

    let mut rx = attachment.rx;
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if send_json(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ChatClientMessage>(&text) {
                            Ok(ChatClientMessage::UserInput { text, enter, .. }) => {
                                let mut payload = text.into_bytes();
                                if enter {
                                    payload.push(b'\n');
                                }
                                if handle.write(Bytes::from(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ChatClientMessage::Resize { cols, rows }) => {
                                let _ = handle.resize(cols, rows).await;
                            }
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

    handle.detach(attachment.viewer_id, ViewerKind::Chat).await;
    state.audit.record(AuditRecord::new("chat_detach").user(&user_id).session(&session_id));
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ChatEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}

#[cfg(test)]
#[path = "ws_chat_tests.rs"]
mod tests;

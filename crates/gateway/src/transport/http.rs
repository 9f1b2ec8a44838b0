// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: session lifecycle (create/attach/close/list) and health.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::AuditRecord;
use crate::error::{ErrorCode, GatewayError};
use crate::pty::attach::{valid_tmux_name, TmuxBackend};
use crate::pty::spawn::NativePty;
use crate::pty::Backend;
use crate::session::{Session, SessionConfig, SessionHandle, SessionInfo, SessionMode, ViewerKind};
use crate::shaper::ShaperConfig;

use super::state::AppState;

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, GatewayError> {
    match state.authenticator.authenticate(headers) {
        Ok(user_id) => {
            state.audit.record(AuditRecord::new("auth_ok").user(&user_id));
            Ok(user_id)
        }
        Err(code) => {
            state.audit.record(AuditRecord::new("auth_fail"));
            Err(GatewayError::new(code, "authentication failed"))
        }
    }
}

fn mode_enabled(state: &AppState, mode: SessionMode) -> Result<(), GatewayError> {
    let enabled = match mode {
        SessionMode::Shell => state.config.enable_shell,
        SessionMode::Node => state.config.enable_node,
        SessionMode::ReadonlyTail => state.config.enable_readonly_tail,
        SessionMode::Tmux => state.config.enable_tmux,
    };
    if enabled {
        Ok(())
    } else {
        Err(GatewayError::new(ErrorCode::ModeDisabled, format!("mode {} is disabled", mode.as_str())))
    }
}

fn resolve_cwd(state: &AppState, requested: Option<&str>) -> PathBuf {
    requested
        .map(PathBuf::from)
        .or_else(|| state.config.default_cwd.clone())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")))
}

fn default_shell(state: &AppState) -> String {
    state
        .config
        .default_shell
        .clone()
        .or_else(|| std::env::var("SHELL").ok())
        .unwrap_or_else(|| "/bin/sh".to_owned())
}

/// Build the backend for a freshly created session, mode-dependent.
fn spawn_backend(
    state: &AppState,
    mode: SessionMode,
    cwd: &std::path::Path,
    cols: u16,
    rows: u16,
    tail_path: Option<&str>,
    tmux_name: Option<&str>,
) -> Result<Box<dyn Backend>, GatewayError> {
    let backend: Box<dyn Backend> = match mode {
        SessionMode::Shell => {
            let shell = default_shell(state);
            let command = vec![shell, "-l".to_owned()];
            Box::new(
                NativePty::spawn(&command, Some(cwd), cols, rows, &[])
                    .map_err(|e| GatewayError::new(ErrorCode::Spawn, e.to_string()))?,
            )
        }
        SessionMode::Node => {
            let command = vec!["node".to_owned()];
            Box::new(
                NativePty::spawn(&command, Some(cwd), cols, rows, &[])
                    .map_err(|e| GatewayError::new(ErrorCode::Spawn, e.to_string()))?,
            )
        }
        SessionMode::ReadonlyTail => {
            let path = tail_path
                .ok_or_else(|| GatewayError::new(ErrorCode::BadRequest, "readonly_tail mode requires \"path\""))?;
            let abs = std::fs::canonicalize(path)
                .map_err(|e| GatewayError::new(ErrorCode::BadRequest, format!("invalid path: {e}")))?;
            let command =
                vec!["tail".to_owned(), "-n".to_owned(), "200".to_owned(), "-f".to_owned(), "--".to_owned(), abs.display().to_string()];
            Box::new(
                NativePty::spawn(&command, Some(cwd), cols, rows, &[])
                    .map_err(|e| GatewayError::new(ErrorCode::Spawn, e.to_string()))?,
            )
        }
        SessionMode::Tmux => {
            let full_name = tmux_name
                .ok_or_else(|| GatewayError::new(ErrorCode::BadRequest, "tmux mode requires \"tmuxName\""))?;
            Box::new(
                TmuxBackend::new(full_name, cwd).map_err(|e| GatewayError::new(ErrorCode::Spawn, e.to_string()))?,
            )
        }
    };
    Ok(backend)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub mode: SessionMode,
    #[serde(default)]
    pub resume_key: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub cols: u16,
    pub rows: u16,
    #[serde(default)]
    pub tmux_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub attach_token: String,
    pub ws_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_name: Option<String>,
}

fn raw_attach_token_response(state: &AppState, handle: &SessionHandle, user_id: &str, cols: u16, rows: u16) -> CreateSessionResponse {
    let token = state.attach_tokens.issue(handle.session_id(), user_id, ViewerKind::Raw, Some((cols, rows)));
    CreateSessionResponse {
        session_id: handle.session_id().to_owned(),
        attach_token: token.clone(),
        ws_url: format!("/ws/sessions/{}", handle.session_id()),
        tmux_name: handle.info().tmux_name,
    }
}

/// `POST /api/sessions/attach-or-create`: reuse a session registered under
/// `resumeKey` if one is live, otherwise create a new one.
pub async fn attach_or_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, GatewayError> {
    let user_id = authenticate(&state, &headers)?;

    if let Some(ref key) = req.resume_key {
        if let Some(handle) = state.manager.find_by_resume_key(key, &user_id).await {
            state
                .audit
                .record(AuditRecord::new("session_attach").user(&user_id).session(handle.session_id()));
            return Ok(Json(raw_attach_token_response(&state, &handle, &user_id, req.cols, req.rows)));
        }
    }

    create_session(state, user_id, req).await
}

/// `POST /api/sessions`: always create a new session.
pub async fn create_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, GatewayError> {
    let user_id = authenticate(&state, &headers)?;
    create_session(state, user_id, req).await
}

async fn create_session(
    state: AppState,
    user_id: String,
    req: CreateSessionRequest,
) -> Result<Json<CreateSessionResponse>, GatewayError> {
    mode_enabled(&state, req.mode)?;

    let full_tmux_name = match (req.mode, req.tmux_name.as_deref()) {
        (SessionMode::Tmux, Some(name)) => {
            if !valid_tmux_name(name) {
                return Err(GatewayError::new(ErrorCode::BadRequest, "invalid tmuxName"));
            }
            Some(format!("{}{}", state.config.tmux_prefix, name))
        }
        (SessionMode::Tmux, None) => {
            return Err(GatewayError::new(ErrorCode::BadRequest, "tmux mode requires \"tmuxName\""))
        }
        _ => None,
    };

    let cwd = resolve_cwd(&state, req.cwd.as_deref());
    let backend = spawn_backend(
        &state,
        req.mode,
        &cwd,
        req.cols,
        req.rows,
        req.path.as_deref(),
        full_tmux_name.as_deref(),
    )?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let shaper_config = ShaperConfig {
        quiet_flush: std::time::Duration::from_millis(state.config.quiet_flush_ms),
        max_lines_flush: state.config.max_lines_flush,
        ..ShaperConfig::default()
    };
    let mut config = SessionConfig::new(&session_id, &user_id, req.mode, cwd, req.cols, req.rows, backend)
        .with_scrollback_capacity(state.config.scrollback_bytes)
        .with_ring_capacity(state.config.chat_ring_capacity)
        .with_shaper_config(shaper_config);
    if let Some(name) = full_tmux_name {
        config = config.with_tmux_name(name);
    }

    let handle = Session::spawn(config);
    state
        .manager
        .register(handle.clone(), req.resume_key.clone())
        .await
        .map_err(|code| GatewayError::new(code, "session registration failed"))?;

    state.audit.record(
        AuditRecord::new("session_create")
            .user(&user_id)
            .session(&session_id)
            .detail(json!({"mode": req.mode.as_str()})),
    );

    Ok(Json(raw_attach_token_response(&state, &handle, &user_id, req.cols, req.rows)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    #[serde(default)]
    pub cols: Option<u16>,
    #[serde(default)]
    pub rows: Option<u16>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachResponse {
    pub session_id: String,
    pub attach_token: String,
    pub ws_url: String,
}

/// `POST /api/sessions/{id}/attach`: mint a raw-view attach token.
pub async fn attach_raw_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(req): Json<AttachRequest>,
) -> Result<Json<AttachResponse>, GatewayError> {
    let user_id = authenticate(&state, &headers)?;
    let handle = state.manager.get(&session_id, &user_id).await.map_err(|c| GatewayError::new(c, "session not found"))?;

    let size = match (req.cols, req.rows) {
        (Some(c), Some(r)) => Some((c, r)),
        _ => None,
    };
    let token = state.attach_tokens.issue(&session_id, &user_id, ViewerKind::Raw, size);
    state.audit.record(AuditRecord::new("session_attach").user(&user_id).session(&session_id));

    Ok(Json(AttachResponse {
        session_id: session_id.clone(),
        attach_token: token,
        ws_url: format!("/ws/sessions/{session_id}"),
    }))
}

/// `POST /api/sessions/{id}/attach-chat`: mint a chat-view attach token.
pub async fn attach_chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(req): Json<AttachRequest>,
) -> Result<Json<AttachResponse>, GatewayError> {
    let user_id = authenticate(&state, &headers)?;
    let _handle = state.manager.get(&session_id, &user_id).await.map_err(|c| GatewayError::new(c, "session not found"))?;

    let size = match (req.cols, req.rows) {
        (Some(c), Some(r)) => Some((c, r)),
        _ => None,
    };
    let token = state.attach_tokens.issue(&session_id, &user_id, ViewerKind::Chat, size);
    state.audit.record(AuditRecord::new("chat_attach").user(&user_id).session(&session_id));

    Ok(Json(AttachResponse {
        session_id: session_id.clone(),
        attach_token: token,
        ws_url: format!("/ws/chat/sessions/{session_id}"),
    }))
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub ok: bool,
}

/// `POST /api/sessions/{id}/close`: terminate the session's backend.
pub async fn close_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<CloseResponse>, GatewayError> {
    let user_id = authenticate(&state, &headers)?;
    state.manager.close(&session_id, &user_id).await.map_err(|c| GatewayError::new(c, "session not found"))?;
    state.audit.record(AuditRecord::new("session_close").user(&user_id).session(&session_id));
    Ok(Json(CloseResponse { ok: true }))
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

/// `GET /api/sessions`: list the authenticated user's live sessions.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListSessionsResponse>, GatewayError> {
    let user_id = authenticate(&state, &headers)?;
    let sessions = state.manager.list(&user_id).await;
    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

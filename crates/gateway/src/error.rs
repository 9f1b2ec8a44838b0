// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified error taxonomy shared across the HTTP and WebSocket surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Missing, malformed, or rejected credentials/attach token.
    AuthError,
    /// The requested mode is disabled by configuration.
    ModeDisabled,
    /// Malformed request (bad JSON, invalid field, invalid tmux name, ...).
    BadRequest,
    /// Session (or other addressed resource) does not exist.
    NotFound,
    /// A configured cap would be exceeded (sessions per user, message size).
    CapExceeded,
    /// The PTY/backend failed to start.
    Spawn,
    /// A viewer could not keep up and was dropped.
    Backpressure,
    /// The underlying process has already exited.
    PtyExit,
    Internal,
}

/// WebSocket close codes this gateway emits. Deliberately narrow: every
/// `ErrorCode` maps to one of these four, per the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsCloseCode {
    Normal = 1000,
    PolicyViolation = 1008,
    MessageTooBig = 1009,
    InternalError = 1011,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthError => 401,
            Self::ModeDisabled => 400,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::CapExceeded => 429,
            Self::Spawn => 500,
            Self::Backpressure => 429,
            Self::PtyExit => 410,
            Self::Internal => 500,
        }
    }

    pub fn ws_close_code(&self) -> WsCloseCode {
        match self {
            Self::AuthError | Self::ModeDisabled | Self::BadRequest | Self::NotFound | Self::CapExceeded => {
                WsCloseCode::PolicyViolation
            }
            Self::Backpressure => WsCloseCode::MessageTooBig,
            Self::Spawn | Self::Internal => WsCloseCode::InternalError,
            Self::PtyExit => WsCloseCode::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "AUTH_ERROR",
            Self::ModeDisabled => "MODE_DISABLED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::CapExceeded => "CAP_EXCEEDED",
            Self::Spawn => "SPAWN",
            Self::Backpressure => "BACKPRESSURE",
            Self::PtyExit => "PTY_EXIT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`ErrorCode`] paired with a human-readable message, the shape returned
/// to HTTP clients as a JSON body and to WS clients as a close reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state handed to every axum handler via `with_state`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::attach_token::AttachTokenRegistry;
use crate::audit::AuditSink;
use crate::auth::Authenticator;
use crate::config::Config;
use crate::manager::SharedSessionManager;

/// Everything a handler needs: the session registry, the pluggable
/// authenticator, the attach-token issuer, the audit sink, and the parsed
/// configuration (mode toggles, default shell/cwd, size caps).
#[derive(Clone)]
pub struct AppState {
    pub manager: SharedSessionManager,
    pub authenticator: Arc<dyn Authenticator>,
    pub attach_tokens: Arc<AttachTokenRegistry>,
    pub audit: Arc<AuditSink>,
    pub config: Arc<Config>,
    pub shutdown: CancellationToken,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-tenant session registry. Generalizes the broker's pod-registry
//! pattern (`RwLock<HashMap<K, V>>` plus a background sweep task) from
//! "registered pods" to "live Sessions", adding the cap / detach-grace /
//! idle-timeout policy this gateway needs instead of pod health checks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::session::{SessionHandle, SessionInfo};

/// How often the background sweep checks for idle/detached sessions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Cap/timeout policy, drawn from [`crate::config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerPolicy {
    pub max_sessions_per_user: usize,
    pub detach_grace: Duration,
    pub idle_timeout: Duration,
}

struct Entry {
    handle: SessionHandle,
    /// When this session's viewer count first reached zero, for detach-grace
    /// bookkeeping. Reset to `None` whenever a viewer attaches.
    unattached_since: Option<Instant>,
}

/// Registry of live [`Session`](crate::session::Session)s, keyed by session
/// id, with a secondary index from `resumeKey` for reattachment.
pub struct SessionManager {
    policy: ManagerPolicy,
    sessions: RwLock<HashMap<String, Entry>>,
    resume_index: RwLock<HashMap<String, String>>,
}

impl SessionManager {
    pub fn new(policy: ManagerPolicy) -> Self {
        Self { policy, sessions: RwLock::new(HashMap::new()), resume_index: RwLock::new(HashMap::new()) }
    }

    /// Register a freshly spawned session, enforcing the per-user cap.
    /// Callers are expected to have already spawned the backend/Session;
    /// this only does bookkeeping, since backend construction is mode
    /// dependent and lives with the HTTP handler that knows the mode.
    pub async fn register(
        &self,
        handle: SessionHandle,
        resume_key: Option<String>,
    ) -> Result<(), ErrorCode> {
        let user_id = handle.user_id().to_owned();
        let mut sessions = self.sessions.write().await;
        let current = sessions.values().filter(|e| e.handle.user_id() == user_id).count();
        if current >= self.policy.max_sessions_per_user {
            return Err(ErrorCode::CapExceeded);
        }

        let session_id = handle.session_id().to_owned();
        sessions.insert(session_id.clone(), Entry { handle, unattached_since: None });
        drop(sessions);

        if let Some(key) = resume_key {
            self.resume_index.write().await.insert(key, session_id);
        }
        Ok(())
    }

    /// Look up a session by id, scoped to `user_id` — a user can never
    /// attach to or close another user's session.
    pub async fn get(&self, session_id: &str, user_id: &str) -> Result<SessionHandle, ErrorCode> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(session_id).ok_or(ErrorCode::NotFound)?;
        if entry.handle.user_id() != user_id {
            return Err(ErrorCode::NotFound);
        }
        Ok(entry.handle.clone())
    }

    /// Look up a session previously registered under `resume_key`, scoped
    /// to `user_id`.
    pub async fn find_by_resume_key(&self, resume_key: &str, user_id: &str) -> Option<SessionHandle> {
        let session_id = self.resume_index.read().await.get(resume_key).cloned()?;
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&session_id)?;
        if entry.handle.user_id() != user_id || entry.handle.is_closed() {
            return None;
        }
        Some(entry.handle.clone())
    }

    pub async fn list(&self, user_id: &str) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|e| e.handle.user_id() == user_id).map(|e| e.handle.info()).collect()
    }

    pub async fn close(&self, session_id: &str, user_id: &str) -> Result<(), ErrorCode> {
        let handle = self.get(session_id, user_id).await?;
        handle.close().await;
        Ok(())
    }

    pub async fn count_for_user(&self, user_id: &str) -> usize {
        self.sessions.read().await.values().filter(|e| e.handle.user_id() == user_id).count()
    }

    /// Background task: prunes closed sessions, and closes sessions that
    /// have sat unattached past `detach_grace` or idle past `idle_timeout`.
    pub async fn run_sweep(&self, shutdown: CancellationToken) {
        info!("session manager sweep started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                _ = shutdown.cancelled() => {
                    debug!("session manager sweep shutting down");
                    return;
                }
            }
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        let now = Instant::now();
        let now_ms = now_ms();
        let mut to_close = Vec::new();
        let mut to_remove = Vec::new();

        {
            let mut sessions = self.sessions.write().await;
            for (session_id, entry) in sessions.iter_mut() {
                if entry.handle.is_closed() {
                    to_remove.push(session_id.clone());
                    continue;
                }

                if entry.handle.viewer_count() == 0 {
                    let since = *entry.unattached_since.get_or_insert(now);
                    if now.duration_since(since) >= self.policy.detach_grace {
                        warn!(session_id, "detach grace expired, closing session");
                        to_close.push(entry.handle.clone());
                        continue;
                    }
                } else {
                    entry.unattached_since = None;
                }

                let idle_ms = now_ms.saturating_sub(entry.handle.last_activity_at());
                if Duration::from_millis(idle_ms) >= self.policy.idle_timeout {
                    warn!(session_id, idle_ms, "idle timeout expired, closing session");
                    to_close.push(entry.handle.clone());
                }
            }
        }

        for handle in to_close {
            handle.close().await;
        }

        if !to_remove.is_empty() {
            let mut sessions = self.sessions.write().await;
            for session_id in &to_remove {
                sessions.remove(session_id);
            }
            let mut resume_index = self.resume_index.write().await;
            resume_index.retain(|_, id| !to_remove.contains(id));
        }
    }
}

pub type SharedSessionManager = Arc<SessionManager>;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

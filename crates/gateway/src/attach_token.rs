// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-use attach tokens: a short-lived, opaque credential minted by
//! `POST /api/sessions/.../attach*` and redeemed exactly once by the
//! corresponding WebSocket upgrade. Keeps the long-lived auth credential
//! (basic/cloudflare) off the WS upgrade path, which browsers and proxies
//! handle less consistently than a query string or subprotocol value.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::session::ViewerKind;

/// What an attach token was minted for.
#[derive(Debug, Clone)]
pub struct AttachBinding {
    pub session_id: String,
    pub user_id: String,
    pub view_kind: ViewerKind,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    pub issued_at: u64,
}

struct Entry {
    binding: AttachBinding,
    expires_at: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Mints and redeems attach tokens. Tokens are single-use: `consume` removes
/// the entry on success, so a replayed token always fails.
pub struct AttachTokenRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl AttachTokenRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Lock the entry table, recovering the guard if a prior holder panicked
    /// while holding it rather than poisoning every call site after it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mint a new token bound to `session_id`/`user_id`/`view_kind`, with an
    /// optional requested terminal size for `resize`-on-attach.
    pub fn issue(
        &self,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        view_kind: ViewerKind,
        size: Option<(u16, u16)>,
    ) -> String {
        let token = random_token();
        let now = now_ms();
        let binding = AttachBinding {
            session_id: session_id.into(),
            user_id: user_id.into(),
            view_kind,
            cols: size.map(|(c, _)| c),
            rows: size.map(|(_, r)| r),
            issued_at: now,
        };
        let expires_at = now + self.ttl.as_millis() as u64;

        let mut entries = self.lock();
        entries.insert(token.clone(), Entry { binding, expires_at });
        token
    }

    /// Redeem `token`. Succeeds exactly once: a second call with the same
    /// token, or a call after the TTL has elapsed, returns `None`.
    pub fn consume(&self, token: &str) -> Option<AttachBinding> {
        let mut entries = self.lock();
        let entry = entries.remove(token)?;
        if now_ms() > entry.expires_at {
            return None;
        }
        Some(entry.binding)
    }

    /// Drop expired entries. Intended to be called periodically by a
    /// background sweep rather than on every `issue`/`consume`.
    pub fn sweep_expired(&self) {
        let now = now_ms();
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at >= now);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 128 bits of randomness, hex-encoded — opaque and unguessable.
fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[path = "attach_token_tests.rs"]
mod tests;

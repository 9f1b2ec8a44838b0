// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit event sink: every session lifecycle and access-control decision is
//! recorded as newline-delimited JSON, either to a configured file or, when
//! unset, via `tracing` — mirroring the structured-logging idiom used
//! throughout the rest of this crate rather than inventing a second format.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub at: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub detail: Value,
}

impl AuditRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { at: now_ms(), kind: kind.into(), user_id: None, session_id: None, detail: Value::Null }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

enum Target {
    File(Mutex<std::fs::File>),
    Tracing,
}

/// Writes [`AuditRecord`]s as newline-delimited JSON. Cheap to clone (an
/// `Arc` internally would be overkill given it's held once in `AppState` and
/// shared by reference) — construct once and pass by reference/Arc.
pub struct AuditSink {
    target: Target,
}

impl AuditSink {
    /// Write audit events to `path`, appending, creating it if absent.
    pub fn to_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path: PathBuf = path.as_ref().to_owned();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { target: Target::File(Mutex::new(file)) })
    }

    /// Write audit events via `tracing::info!` instead of a dedicated file.
    pub fn to_tracing() -> Self {
        Self { target: Target::Tracing }
    }

    pub fn record(&self, record: AuditRecord) {
        match &self.target {
            Target::File(file) => {
                let line = match serde_json::to_string(&record) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize audit record");
                        return;
                    }
                };
                let mut file = file.lock().expect("audit log file mutex poisoned");
                if let Err(e) = writeln!(file, "{line}") {
                    warn!(error = %e, "failed to write audit record");
                }
            }
            Target::Tracing => {
                info!(
                    audit_type = %record.kind,
                    user_id = record.user_id.as_deref(),
                    session_id = record.session_id.as_deref(),
                    detail = %record.detail,
                    "audit event"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the two WebSocket surfaces: the raw byte-stream view
//! (`/ws/sessions/{id}`) and the structured chat view
//! (`/ws/chat/sessions/{id}`). The chat view's server→client shape is
//! [`crate::event::ChatEvent`] directly — there is no separate envelope.

use serde::{Deserialize, Serialize};

/// Inbound control messages on the raw-view socket. PTY input itself arrives
/// as binary frames, handled outside this enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawClientMessage {
    Hello,
    Resize { cols: u16, rows: u16 },
    Ping,
}

/// Outbound control messages on the raw-view socket. Live PTY bytes are sent
/// as binary frames, not through this enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawServerMessage {
    Snapshot { data: String },
    Exit { exit_code: Option<i32>, signal: Option<i32> },
    Pong,
}

/// Inbound message on the chat-view socket: text a user typed, optionally
/// tagged with a client-chosen `messageId` and whether to submit it (append
/// a trailing newline) or leave it pending.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatClientMessage {
    UserInput {
        text: String,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default = "default_enter")]
        enter: bool,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
}

fn default_enter() -> bool {
    true
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-shaped chat events and the input/signal events that flow from a
//! viewer down into a [`crate::pty::Backend`].

use bytes::Bytes;
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

/// A byte-oriented channel a line of PTY output was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Stdout,
    Stderr,
}

/// One entry in a Session's chat ring. `seq` is strictly increasing per
/// Session and never reused; meta events (`hello`, `snapshot_ready`) are
/// assigned `seq = 0` and are never stored in the ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Hello {
        version: u32,
        capabilities: Vec<String>,
    },
    SnapshotReady {
        replay_event_count: usize,
        oldest_seq: u64,
        newest_seq: u64,
    },
    UserInput {
        seq: u64,
        ts: u64,
        text: String,
        message_id: String,
    },
    StdoutChunk {
        seq: u64,
        ts: u64,
        text: String,
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    StderrChunk {
        seq: u64,
        ts: u64,
        text: String,
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    MessagePatch {
        seq: u64,
        ts: u64,
        message_id: String,
        append_text: String,
        channel: Channel,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_append_text: Option<String>,
    },
    MessageCommit {
        seq: u64,
        ts: u64,
        message_id: String,
        final_text: String,
        channel: Channel,
        line_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_final_text: Option<String>,
    },
    PromptReady {
        seq: u64,
        ts: u64,
    },
    Exit {
        seq: u64,
        ts: u64,
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
}

impl ChatEvent {
    /// The event's sequence number, or `0` for meta events that are never
    /// stored in the ring (`hello`, `snapshot_ready`).
    pub fn seq(&self) -> u64 {
        match self {
            Self::Hello { .. } | Self::SnapshotReady { .. } => 0,
            Self::UserInput { seq, .. }
            | Self::StdoutChunk { seq, .. }
            | Self::StderrChunk { seq, .. }
            | Self::MessagePatch { seq, .. }
            | Self::MessageCommit { seq, .. }
            | Self::PromptReady { seq, .. }
            | Self::Exit { seq, .. } => *seq,
        }
    }

    /// Whether this event is a meta event that must never be stored in the
    /// ring buffer (it has no stable `seq` slot).
    pub fn is_meta(&self) -> bool {
        matches!(self, Self::Hello { .. } | Self::SnapshotReady { .. })
    }
}

/// Input handed to a [`crate::pty::Backend`] by a Session.
#[derive(Debug, Clone)]
pub enum InputEvent {
    Write(Bytes),
    Resize { cols: u16, rows: u16 },
    Signal(PtySignal),
}

/// Named signals that can be delivered to the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtySignal {
    Hup,
    Int,
    Quit,
    Kill,
    Term,
    Winch,
}

impl PtySignal {
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        let bare: &str = upper.strip_prefix("SIG").unwrap_or(&upper);
        match bare {
            "HUP" | "1" => Some(Self::Hup),
            "INT" | "2" => Some(Self::Int),
            "QUIT" | "3" => Some(Self::Quit),
            "KILL" | "9" => Some(Self::Kill),
            "TERM" | "15" => Some(Self::Term),
            "WINCH" | "28" => Some(Self::Winch),
            _ => None,
        }
    }

    pub fn to_nix(self) -> Signal {
        match self {
            Self::Hup => Signal::SIGHUP,
            Self::Int => Signal::SIGINT,
            Self::Quit => Signal::SIGQUIT,
            Self::Kill => Signal::SIGKILL,
            Self::Term => Signal::SIGTERM,
            Self::Winch => Signal::SIGWINCH,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Converts a raw PTY byte stream into ordered [`ChatEvent`]s.
//!
//! Maps cleanly to a tagged-state value per channel
//! (`Idle | Appending{channel, text, line_count, message_id}`); the quiet
//! flush is driven by the owning Session's select loop rather than a timer
//! thread embedded in the shaper, so there are no hidden mutable fields
//! shared with I/O threads.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use regex::Regex;

use crate::event::{ChatEvent, Channel};

/// Default quiet-flush delay: commit the in-flight message if no more bytes
/// arrive on its channel within this window.
pub const DEFAULT_QUIET_FLUSH_MS: u64 = 200;
/// Commit once the accumulated message reaches this many lines.
pub const DEFAULT_MAX_LINES_FLUSH: usize = 80;

fn default_prompt_patterns() -> Vec<Regex> {
    // `$`, `%`, `>`, `#` at end of line; oh-my-zsh arrow; `[user@host dir]$`.
    [
        r"[$%>#]\s*$",
        r"(?m)➜\s*$",
        r"^\[[^\]]+\]\s*[$%>#]\s*$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
}

/// Tunable shaper behavior. Mirrors spec §4.4.
#[derive(Debug, Clone)]
pub struct ShaperConfig {
    pub strip_ansi: bool,
    pub quiet_flush: Duration,
    pub max_lines_flush: usize,
    pub debug_raw: bool,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            strip_ansi: true,
            quiet_flush: Duration::from_millis(DEFAULT_QUIET_FLUSH_MS),
            max_lines_flush: DEFAULT_MAX_LINES_FLUSH,
            debug_raw: false,
        }
    }
}

/// State of a single channel's (stdout or stderr) in-flight message.
#[derive(Debug)]
enum ChannelState {
    Idle,
    Appending { message_id: String, text: String, raw: String, line_count: usize },
}

/// Global monotonic counter for `messageId` generation, process-wide unique
/// when combined with a random suffix.
static MESSAGE_COUNTER: AtomicU32 = AtomicU32::new(0);

fn next_message_id() -> String {
    let n = MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand_suffix: u32 = rand::random();
    format!("msg-{n}-{rand_suffix:08x}")
}

/// Stateful converter from raw PTY bytes into chat events. One instance
/// per Session, driven exclusively from the Session's dispatch loop.
pub struct StreamShaper {
    config: ShaperConfig,
    prompt_patterns: Vec<Regex>,
    stdout: ChannelState,
    stderr: ChannelState,
    /// Channel whose in-flight message, if any, has a quiet-flush timer
    /// armed in the owning Session's select loop.
    active_channel: Option<Channel>,
}

/// What the Session's select loop should do after feeding the shaper bytes
/// or a quiet-flush tick.
pub struct ShaperOutput {
    pub events: Vec<ChatEvent>,
    /// Whether a message is still open after this call (the Session should
    /// (re)arm its quiet-flush timer for `active_channel`).
    pub quiet_flush_armed: bool,
}

impl StreamShaper {
    pub fn new(config: ShaperConfig) -> Self {
        Self {
            prompt_patterns: default_prompt_patterns(),
            config,
            stdout: ChannelState::Idle,
            stderr: ChannelState::Idle,
            active_channel: None,
        }
    }

    fn state_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Stdout => &mut self.stdout,
            Channel::Stderr => &mut self.stderr,
        }
    }

    /// Feed a chunk of bytes read from `channel`, returning the chat events
    /// it produces. `alloc_seq` is called once per non-meta event to assign
    /// a strictly increasing, Session-scoped `seq`.
    pub fn feed(
        &mut self,
        channel: Channel,
        data: &[u8],
        mut alloc_seq: impl FnMut() -> u64,
        mut now_ms: impl FnMut() -> u64,
    ) -> ShaperOutput {
        let mut events = Vec::new();

        // Committing any other channel's in-flight message before switching.
        if let Some(active) = self.active_channel {
            if active != channel {
                if let Some(e) = self.commit(active, &mut alloc_seq, &mut now_ms) {
                    events.push(e);
                }
            }
        }

        let (stripped, raw_opt) = self.normalize(data);

        let is_new = matches!(self.state_mut(channel), ChannelState::Idle);
        if is_new {
            let message_id = next_message_id();
            events.push(open_chunk_event(channel, &message_id, alloc_seq(), now_ms(), raw_opt.clone()));
            *self.state_mut(channel) =
                ChannelState::Appending { message_id, text: String::new(), raw: String::new(), line_count: 0 };
        }

        let prompt_patterns = self.prompt_patterns.clone();
        let max_lines = self.config.max_lines_flush;
        let (message_id, append_text, commit_now, prompt_matched) = {
            let state = self.state_mut(channel);
            let ChannelState::Appending { message_id, text, raw, line_count } = state else {
                unreachable!("just transitioned to Appending above")
            };
            text.push_str(&stripped);
            if let Some(ref r) = raw_opt {
                raw.push_str(r);
            }
            *line_count = text.matches('\n').count();

            let prompt_matched = prompt_patterns.iter().any(|p| p.is_match(text));
            let commit_now = *line_count >= max_lines || prompt_matched;
            (message_id.clone(), stripped.clone(), commit_now, prompt_matched)
        };

        if !append_text.is_empty() || !is_new {
            events.push(ChatEvent::MessagePatch {
                seq: alloc_seq(),
                ts: now_ms(),
                message_id,
                append_text,
                channel,
                raw_append_text: if self.config.debug_raw { raw_opt } else { None },
            });
        }

        self.active_channel = Some(channel);

        if commit_now {
            if let Some(e) = self.commit(channel, &mut alloc_seq, &mut now_ms) {
                events.push(e);
            }
            if prompt_matched {
                events.push(ChatEvent::PromptReady { seq: alloc_seq(), ts: now_ms() });
            }
        }

        ShaperOutput { events, quiet_flush_armed: self.active_channel.is_some() }
    }

    /// Called by the Session's select loop when the quiet-flush timer for
    /// `active_channel` fires with no intervening bytes.
    pub fn quiet_tick(
        &mut self,
        mut alloc_seq: impl FnMut() -> u64,
        mut now_ms: impl FnMut() -> u64,
    ) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        if let Some(channel) = self.active_channel {
            if let Some(e) = self.commit(channel, &mut alloc_seq, &mut now_ms) {
                events.push(e);
            }
        }
        events
    }

    /// Called on PTY exit: commit any in-flight message, then emit `exit`.
    pub fn close(
        &mut self,
        exit_code: Option<i32>,
        signal: Option<i32>,
        mut alloc_seq: impl FnMut() -> u64,
        mut now_ms: impl FnMut() -> u64,
    ) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        if let Some(channel) = self.active_channel {
            if let Some(e) = self.commit(channel, &mut alloc_seq, &mut now_ms) {
                events.push(e);
            }
        }
        events.push(ChatEvent::Exit { seq: alloc_seq(), ts: now_ms(), exit_code, signal });
        events
    }

    pub fn quiet_flush_delay(&self) -> Duration {
        self.config.quiet_flush
    }

    pub fn active_channel(&self) -> Option<Channel> {
        self.active_channel
    }

    fn commit(
        &mut self,
        channel: Channel,
        alloc_seq: &mut impl FnMut() -> u64,
        now_ms: &mut impl FnMut() -> u64,
    ) -> Option<ChatEvent> {
        let prior = std::mem::replace(self.state_mut(channel), ChannelState::Idle);
        if self.active_channel == Some(channel) {
            self.active_channel = None;
        }
        match prior {
            ChannelState::Idle => None,
            ChannelState::Appending { message_id, text, raw, line_count } => {
                Some(ChatEvent::MessageCommit {
                    seq: alloc_seq(),
                    ts: now_ms(),
                    message_id,
                    line_count,
                    final_text: text,
                    channel,
                    raw_final_text: if self.config.debug_raw { Some(raw) } else { None },
                })
            }
        }
    }

    /// Strip ANSI CSI/OSC sequences, fold `\r\n` into `\n`, and discard
    /// progress-bar carriage-return overwrites (text followed by `\r` with
    /// no following `\n`). Returns `(stripped, raw_if_debug)`.
    fn normalize(&self, data: &[u8]) -> (String, Option<String>) {
        let text = String::from_utf8_lossy(data).into_owned();
        let raw = if self.config.debug_raw { Some(text.clone()) } else { None };
        if !self.config.strip_ansi {
            return (text, raw);
        }
        (strip_ansi_and_fold(&text), raw)
    }
}

fn open_chunk_event(
    channel: Channel,
    message_id: &str,
    seq: u64,
    ts: u64,
    raw: Option<String>,
) -> ChatEvent {
    match channel {
        Channel::Stdout => {
            ChatEvent::StdoutChunk { seq, ts, text: String::new(), message_id: message_id.to_owned(), raw }
        }
        Channel::Stderr => {
            ChatEvent::StderrChunk { seq, ts, text: String::new(), message_id: message_id.to_owned(), raw }
        }
    }
}

/// Strip ANSI CSI (`ESC [ ... letter`) and OSC (`ESC ] ... BEL|ST`)
/// sequences, fold `\r\n` to `\n`, and discard progress-bar style
/// carriage-return overwrites. Idempotent: running it twice is a no-op.
pub fn strip_ansi_and_fold(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    // Buffer the current visual line so a bare `\r` (no following `\n`)
    // can discard it (progress-bar overwrite) instead of emitting it.
    let mut pending_line = String::new();

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x1b if i + 1 < bytes.len() && bytes[i + 1] == b'[' => {
                // CSI: ESC [ params... final-byte (0x40..=0x7e)
                let mut j = i + 2;
                while j < bytes.len() && !(0x40..=0x7e).contains(&bytes[j]) {
                    j += 1;
                }
                i = (j + 1).min(bytes.len());
            }
            0x1b if i + 1 < bytes.len() && bytes[i + 1] == b']' => {
                // OSC: ESC ] ... terminated by BEL (0x07) or ST (ESC \)
                let mut j = i + 2;
                loop {
                    if j >= bytes.len() {
                        break;
                    }
                    if bytes[j] == 0x07 {
                        j += 1;
                        break;
                    }
                    if bytes[j] == 0x1b && j + 1 < bytes.len() && bytes[j + 1] == b'\\' {
                        j += 2;
                        break;
                    }
                    j += 1;
                }
                i = j;
            }
            b'\r' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    out.push_str(&pending_line);
                    out.push('\n');
                    pending_line.clear();
                    i += 2;
                } else {
                    // Progress-bar overwrite: discard the pending line, the
                    // cursor returned to column 0 without a newline.
                    pending_line.clear();
                    i += 1;
                }
            }
            b'\n' => {
                out.push_str(&pending_line);
                out.push('\n');
                pending_line.clear();
                i += 1;
            }
            _ => {
                // Copy one UTF-8 scalar at a time to stay char-boundary safe.
                let rest = &input[byte_char_start(input, i)..];
                if let Some(ch) = rest.chars().next() {
                    pending_line.push(ch);
                    i += ch.len_utf8();
                } else {
                    i += 1;
                }
            }
        }
    }
    out.push_str(&pending_line);
    out
}

fn byte_char_start(s: &str, i: usize) -> usize {
    // `i` always lands on a char boundary here since control bytes (<0x80)
    // are matched individually above; this just satisfies the borrow.
    if s.is_char_boundary(i) {
        i
    } else {
        i.saturating_sub(1)
    }
}

#[cfg(test)]
#[path = "shaper_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session runtime: the single dedicated task that owns a PTY/tmux backend,
//! the raw scrollback, the chat ring, and the [`crate::shaper::StreamShaper`],
//! and fans their output out to attached viewers.
//!
//! Everything mutable lives behind the task's own select loop, reached only
//! through [`SessionHandle`]'s `mpsc::Sender<SessionCommand>`. Attach and
//! PTY-output dispatch are therefore strictly serialized: a viewer's replay
//! window is always computed after its channel is registered in the same
//! loop iteration that handles the attach command, so no event can be
//! skipped or duplicated across the subscribe/replay boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{Channel, ChatEvent, PtySignal};
use crate::pty::{Backend, BackendInput, Boxed, ExitStatus};
use crate::ring::RingBuffer;
use crate::scrollback::ScrollbackBuffer;
use crate::shaper::{ShaperConfig, StreamShaper};

/// How a new session's PTY/backend is established. Each resolves to a
/// different argv (or, for `Tmux`, a different attach mechanism) on the
/// same underlying spawn path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Shell,
    Node,
    ReadonlyTail,
    Tmux,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Node => "node",
            Self::ReadonlyTail => "readonly_tail",
            Self::Tmux => "tmux",
        }
    }
}

/// Which of a Session's two fan-out views a viewer is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKind {
    Raw,
    Chat,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Runtime configuration for a new [`Session`]; not derivable from
/// [`crate::config::Config`] alone since it carries the already-spawned
/// backend and per-session identity.
pub struct SessionConfig {
    pub session_id: String,
    pub user_id: String,
    pub mode: SessionMode,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
    pub tmux_name: Option<String>,
    pub backend: Box<dyn Backend>,
    pub scrollback_capacity: usize,
    pub ring_capacity: usize,
    pub shaper_config: ShaperConfig,
}

impl SessionConfig {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        mode: SessionMode,
        cwd: PathBuf,
        cols: u16,
        rows: u16,
        backend: impl Boxed,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            mode,
            cwd,
            cols,
            rows,
            tmux_name: None,
            backend: backend.boxed(),
            scrollback_capacity: 1_048_576,
            ring_capacity: crate::ring::DEFAULT_CAPACITY,
            shaper_config: ShaperConfig::default(),
        }
    }

    pub fn with_tmux_name(mut self, name: impl Into<String>) -> Self {
        self.tmux_name = Some(name.into());
        self
    }

    pub fn with_scrollback_capacity(mut self, capacity: usize) -> Self {
        self.scrollback_capacity = capacity;
        self
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    pub fn with_shaper_config(mut self, config: ShaperConfig) -> Self {
        self.shaper_config = config;
        self
    }
}

/// Serializable projection of a Session's state, returned by `GET /api/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub mode: SessionMode,
    pub cwd: String,
    pub cols: u16,
    pub rows: u16,
    pub created_at: u64,
    pub last_activity_at: u64,
    pub tmux_name: Option<String>,
    pub raw_viewer_count: usize,
    pub chat_viewer_count: usize,
}

/// Shared, lock-free bookkeeping a [`SessionHandle`] can read without
/// round-tripping through the Session task.
struct SharedInfo {
    session_id: String,
    user_id: String,
    mode: SessionMode,
    cwd: PathBuf,
    cols: AtomicU64,
    rows: AtomicU64,
    created_at: u64,
    last_activity_at: AtomicU64,
    tmux_name: Option<String>,
    raw_viewer_count: AtomicU64,
    chat_viewer_count: AtomicU64,
    closed: AtomicU64,
}

/// A live raw-view attachment: a byte snapshot plus the live stream past it.
pub struct RawAttachment {
    pub viewer_id: u64,
    pub snapshot: Vec<u8>,
    pub rx: mpsc::Receiver<Bytes>,
}

/// A live chat-view attachment: meta events, replay, and the live stream.
pub struct ChatAttachment {
    pub viewer_id: u64,
    pub hello: ChatEvent,
    pub snapshot_ready: ChatEvent,
    pub replay: Vec<ChatEvent>,
    pub rx: mpsc::Receiver<ChatEvent>,
}

enum SessionCommand {
    Write(Bytes),
    Resize { cols: u16, rows: u16 },
    Signal(PtySignal),
    AttachRaw { reply: oneshot::Sender<RawAttachment> },
    AttachChat { after_seq: Option<u64>, reply: oneshot::Sender<ChatAttachment> },
    Detach { viewer_id: u64, kind: ViewerKind },
    Close,
}

/// Cloneable front to a running Session. Cheap to clone and send across
/// tasks; all mutation happens inside the Session's own task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    shared: Arc<SharedInfo>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    pub fn mode(&self) -> SessionMode {
        self.shared.mode
    }

    /// Whether the Session's task has stopped processing commands — either
    /// the backend exited or `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) != 0 || self.tx.is_closed()
    }

    pub fn last_activity_at(&self) -> u64 {
        self.shared.last_activity_at.load(Ordering::Acquire)
    }

    pub fn viewer_count(&self) -> usize {
        (self.shared.raw_viewer_count.load(Ordering::Relaxed)
            + self.shared.chat_viewer_count.load(Ordering::Relaxed)) as usize
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.shared.session_id.clone(),
            user_id: self.shared.user_id.clone(),
            mode: self.shared.mode,
            cwd: self.shared.cwd.display().to_string(),
            cols: self.shared.cols.load(Ordering::Relaxed) as u16,
            rows: self.shared.rows.load(Ordering::Relaxed) as u16,
            created_at: self.shared.created_at,
            last_activity_at: self.shared.last_activity_at.load(Ordering::Acquire),
            tmux_name: self.shared.tmux_name.clone(),
            raw_viewer_count: self.shared.raw_viewer_count.load(Ordering::Relaxed) as usize,
            chat_viewer_count: self.shared.chat_viewer_count.load(Ordering::Relaxed) as usize,
        }
    }

    pub async fn write(&self, data: Bytes) -> anyhow::Result<()> {
        self.tx.send(SessionCommand::Write(data)).await.map_err(|_| closed_err())
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.tx.send(SessionCommand::Resize { cols, rows }).await.map_err(|_| closed_err())
    }

    pub async fn send_signal(&self, signal: PtySignal) -> anyhow::Result<()> {
        self.tx.send(SessionCommand::Signal(signal)).await.map_err(|_| closed_err())
    }

    pub async fn attach_raw(&self) -> anyhow::Result<RawAttachment> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionCommand::AttachRaw { reply }).await.map_err(|_| closed_err())?;
        rx.await.map_err(|_| closed_err())
    }

    pub async fn attach_chat(&self, after_seq: Option<u64>) -> anyhow::Result<ChatAttachment> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SessionCommand::AttachChat { after_seq, reply }).await.map_err(|_| closed_err())?;
        rx.await.map_err(|_| closed_err())
    }

    pub async fn detach(&self, viewer_id: u64, kind: ViewerKind) {
        let _ = self.tx.send(SessionCommand::Detach { viewer_id, kind }).await;
    }

    pub async fn close(&self) {
        let _ = self.tx.send(SessionCommand::Close).await;
    }
}

fn closed_err() -> anyhow::Error {
    anyhow::anyhow!("session is closed")
}

const VIEWER_QUEUE_CAPACITY: usize = 256;

struct ViewerMaps {
    raw: HashMap<u64, mpsc::Sender<Bytes>>,
    chat: HashMap<u64, mpsc::Sender<ChatEvent>>,
    next_id: u64,
}

impl ViewerMaps {
    fn new() -> Self {
        Self { raw: HashMap::new(), chat: HashMap::new(), next_id: 1 }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Send to every raw viewer, evicting any whose queue is full — a slow
    /// consumer loses its stream rather than stalling the Session.
    fn broadcast_raw(&mut self, data: &Bytes) {
        self.raw.retain(|id, tx| match tx.try_send(data.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(viewer_id = id, "raw viewer backpressured, evicting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn broadcast_chat(&mut self, event: &ChatEvent) {
        self.chat.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(viewer_id = id, "chat viewer backpressured, evicting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// The Session's owned mutable state, run in its own task via [`Session::spawn`].
pub struct Session {
    shared: Arc<SharedInfo>,
    backend_output_rx: mpsc::Receiver<Bytes>,
    backend_input_tx: mpsc::Sender<BackendInput>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    backend_handle: JoinHandle<anyhow::Result<ExitStatus>>,
    child_pid: Option<u32>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    scrollback: ScrollbackBuffer,
    ring: RingBuffer,
    shaper: StreamShaper,
    seq: u64,
    viewers: ViewerMaps,
}

impl Session {
    /// Build, spawn, and return a handle to a new Session.
    pub fn spawn(config: SessionConfig) -> SessionHandle {
        let SessionConfig {
            session_id,
            user_id,
            mode,
            cwd,
            cols,
            rows,
            tmux_name,
            mut backend,
            scrollback_capacity,
            ring_capacity,
            shaper_config,
        } = config;

        let child_pid = backend.child_pid();
        let _ = backend.resize(cols, rows);

        let (backend_output_tx, backend_output_rx) = mpsc::channel(256);
        let (backend_input_tx, backend_input_rx) = mpsc::channel::<BackendInput>(256);
        let (resize_tx, resize_rx) = mpsc::channel(4);

        let backend_handle =
            tokio::spawn(async move { backend.run(backend_output_tx, backend_input_rx, resize_rx).await });

        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let shared = Arc::new(SharedInfo {
            session_id: session_id.clone(),
            user_id,
            mode,
            cwd,
            cols: AtomicU64::new(cols as u64),
            rows: AtomicU64::new(rows as u64),
            created_at: now_ms(),
            last_activity_at: AtomicU64::new(now_ms()),
            tmux_name,
            raw_viewer_count: AtomicU64::new(0),
            chat_viewer_count: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        });

        let session = Session {
            shared: Arc::clone(&shared),
            backend_output_rx,
            backend_input_tx,
            resize_tx,
            backend_handle,
            child_pid,
            cmd_rx,
            scrollback: ScrollbackBuffer::new(scrollback_capacity),
            ring: RingBuffer::new(ring_capacity),
            shaper: StreamShaper::new(shaper_config),
            seq: 0,
            viewers: ViewerMaps::new(),
        };

        tokio::spawn(session.run());

        SessionHandle { tx: cmd_tx, shared }
    }

    async fn run(mut self) {
        let session_id = self.shared.session_id.clone();
        let mut quiet_flush = tokio::time::interval(self.shaper.quiet_flush_delay());
        quiet_flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut armed = false;

        let backend_exit_status = loop {
            tokio::select! {
                data = self.backend_output_rx.recv() => {
                    match data {
                        Some(bytes) => {
                            self.touch();
                            self.scrollback.write(&bytes);
                            self.viewers.broadcast_raw(&bytes);

                            let mut seq = self.seq;
                            let output = self.shaper.feed(Channel::Stdout, &bytes, || { seq += 1; seq }, now_ms);
                            self.seq = seq;
                            for event in output.events {
                                self.store_and_broadcast(event);
                            }
                            armed = output.quiet_flush_armed;
                        }
                        None => break ExitStatus::default(),
                    }
                }

                _ = quiet_flush.tick(), if armed => {
                    let mut seq = self.seq;
                    let events = self.shaper.quiet_tick(|| { seq += 1; seq }, now_ms);
                    self.seq = seq;
                    for event in events {
                        self.store_and_broadcast(event);
                    }
                    armed = self.shaper.active_channel().is_some();
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Write(data)) => {
                            self.touch();
                            let seq = self.next_seq();
                            let text = String::from_utf8_lossy(&data).into_owned();
                            self.store_and_broadcast(ChatEvent::UserInput {
                                seq,
                                ts: now_ms(),
                                text,
                                message_id: format!("msg-input-{seq}"),
                            });
                            if self.backend_input_tx.send(BackendInput::Write(data)).await.is_err() {
                                debug!(session_id, "backend input channel closed");
                                break ExitStatus::default();
                            }
                        }
                        Some(SessionCommand::Resize { cols, rows }) => {
                            self.shared.cols.store(cols as u64, Ordering::Relaxed);
                            self.shared.rows.store(rows as u64, Ordering::Relaxed);
                            let _ = self.resize_tx.try_send((cols, rows));
                        }
                        Some(SessionCommand::Signal(signal)) => {
                            if let Some(pid) = self.child_pid {
                                let _ = kill(Pid::from_raw(pid as i32), signal.to_nix());
                            }
                        }
                        Some(SessionCommand::AttachRaw { reply }) => {
                            let id = self.viewers.alloc_id();
                            let (tx, rx) = mpsc::channel(VIEWER_QUEUE_CAPACITY);
                            self.viewers.raw.insert(id, tx);
                            self.shared.raw_viewer_count.store(self.viewers.raw.len() as u64, Ordering::Relaxed);
                            let snapshot = self.scrollback.snapshot();
                            let _ = reply.send(RawAttachment { viewer_id: id, snapshot, rx });
                        }
                        Some(SessionCommand::AttachChat { after_seq, reply }) => {
                            let id = self.viewers.alloc_id();
                            let (tx, rx) = mpsc::channel(VIEWER_QUEUE_CAPACITY);
                            self.viewers.chat.insert(id, tx);
                            self.shared.chat_viewer_count.store(self.viewers.chat.len() as u64, Ordering::Relaxed);
                            let replay = self.ring.range_after(after_seq.unwrap_or(0));
                            let (oldest_seq, newest_seq) = self.ring.range();
                            let hello = ChatEvent::Hello { version: 1, capabilities: vec!["chat".to_owned()] };
                            let snapshot_ready = ChatEvent::SnapshotReady {
                                replay_event_count: replay.len(),
                                oldest_seq,
                                newest_seq,
                            };
                            let _ = reply.send(ChatAttachment { viewer_id: id, hello, snapshot_ready, replay, rx });
                        }
                        Some(SessionCommand::Detach { viewer_id, kind }) => match kind {
                            ViewerKind::Raw => {
                                self.viewers.raw.remove(&viewer_id);
                                self.shared.raw_viewer_count.store(self.viewers.raw.len() as u64, Ordering::Relaxed);
                            }
                            ViewerKind::Chat => {
                                self.viewers.chat.remove(&viewer_id);
                                self.shared.chat_viewer_count.store(self.viewers.chat.len() as u64, Ordering::Relaxed);
                            }
                        },
                        Some(SessionCommand::Close) | None => {
                            if let Some(pid) = self.child_pid {
                                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                            }
                            break ExitStatus::default();
                        }
                    }
                }
            }
        };

        drop(self.backend_input_tx);
        let exit_status = match self.backend_handle.await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "backend exited with error");
                backend_exit_status
            }
            Err(e) => {
                warn!(session_id, error = %e, "backend task panicked or was cancelled");
                backend_exit_status
            }
        };

        let mut seq = self.seq;
        let exit_events = self.shaper.close(exit_status.code, exit_status.signal, || { seq += 1; seq }, now_ms);
        self.seq = seq;
        for event in exit_events {
            self.store_and_broadcast(event);
        }

        self.shared.closed.store(1, Ordering::Release);
        info!(session_id, code = ?exit_status.code, signal = ?exit_status.signal, "session closed");
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn touch(&self) {
        self.shared.last_activity_at.store(now_ms(), Ordering::Release);
    }

    fn store_and_broadcast(&mut self, event: ChatEvent) {
        if !event.is_meta() {
            self.ring.append(event.clone());
        }
        self.viewers.broadcast_chat(&event);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

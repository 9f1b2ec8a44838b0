// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PtyProcess abstraction: owns an OS PTY (or, for `tmux` mode, an
//! attachment to one) plus its child process.

pub mod attach;
pub mod nbio;
pub mod spawn;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Exit status of a terminated child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Input delivered to a running backend.
#[derive(Debug)]
pub enum BackendInput {
    /// Raw bytes to write to the PTY (user input, verbatim).
    Write(Bytes),
    /// Drain marker: since the backend processes messages sequentially, all
    /// prior writes are complete when this is received.
    Drain(tokio::sync::oneshot::Sender<()>),
}

/// Terminal backend abstraction over a native PTY or a multiplexer
/// attachment. Object-safe for use as `Box<dyn Backend>`.
pub trait Backend: Send + 'static {
    /// Run the backend to completion: read loop feeding `output_tx`,
    /// write loop draining `input_rx`, resize loop draining `resize_rx`.
    /// Returns once the child exits or the channels are closed.
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<BackendInput>,
        resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>;

    /// Resize the PTY. Idempotent — a no-op if the size is unchanged.
    fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()>;

    fn child_pid(&self) -> Option<u32>;
}

/// Conversion trait so both concrete backends and `Box<dyn Backend>` can be
/// passed to [`crate::session::SessionConfig::new`] without explicit boxing.
pub trait Boxed {
    fn boxed(self) -> Box<dyn Backend>;
}

impl<T: Backend> Boxed for T {
    fn boxed(self) -> Box<dyn Backend> {
        Box::new(self)
    }
}

impl Boxed for Box<dyn Backend> {
    fn boxed(self) -> Box<dyn Backend> {
        self
    }
}

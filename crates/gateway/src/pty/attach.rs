// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tmux` mode: the cross-connection sharing primitive. Two Sessions with
//! different `resumeKey`s but the same `tmuxName` both attach to the same
//! underlying tmux session via `new-session -A`, so keystrokes in one are
//! visible in the other via tmux's own rendering, not anything this crate
//! implements.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Backend, BackendInput, ExitStatus};

/// Backend that polls `tmux capture-pane` for the rendered screen and
/// relays input via `send-keys`. tmux itself is the sharing mechanism —
/// this backend does not fan out to other attachments beyond what tmux's
/// own session model already provides.
pub struct TmuxBackend {
    target: String,
    poll_interval: Duration,
}

impl TmuxBackend {
    /// Create-or-attach to tmux session `name` at `cwd`, matching
    /// `tmux new-session -A -s <name> -c <cwd>` semantics: attaches if the
    /// session already exists, creates it (detached) otherwise.
    pub fn new(name: &str, cwd: &Path) -> anyhow::Result<Self> {
        let status = std::process::Command::new("tmux")
            .args(["new-session", "-A", "-d", "-s", name, "-c"])
            .arg(cwd)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => {}
            Ok(s) => anyhow::bail!("tmux new-session -A exited with {s}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                anyhow::bail!("tmux is not installed or not in PATH")
            }
            Err(e) => return Err(anyhow::Error::new(e).context("failed to start tmux session")),
        }

        Ok(Self { target: name.to_owned(), poll_interval: Duration::from_millis(500) })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn tmux_cmd(&self) -> std::process::Command {
        std::process::Command::new("tmux")
    }

    fn tmux_async_cmd(&self) -> tokio::process::Command {
        tokio::process::Command::new("tmux")
    }
}

impl Backend for TmuxBackend {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<BackendInput>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        Box::pin(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            let mut prev_capture = String::new();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let output = self.tmux_async_cmd()
                            .args(["capture-pane", "-p", "-e", "-t", &self.target])
                            .output()
                            .await;

                        match output {
                            Ok(out) if out.status.success() => {
                                let capture = String::from_utf8_lossy(&out.stdout).into_owned();
                                if capture != prev_capture {
                                    prev_capture = capture.clone();
                                    let frame = format!("\x1b[H\x1b[2J{capture}");
                                    if output_tx.send(Bytes::from(frame)).await.is_err() {
                                        return Ok(ExitStatus::default());
                                    }
                                }
                            }
                            _ => return Ok(ExitStatus::default()),
                        }
                    }
                    data = input_rx.recv() => {
                        match data {
                            Some(BackendInput::Write(bytes)) => {
                                let text = String::from_utf8_lossy(&bytes);
                                let status = self.tmux_async_cmd()
                                    .args(["send-keys", "-l", "-t", &self.target, &text])
                                    .stdout(std::process::Stdio::null())
                                    .stderr(std::process::Stdio::null())
                                    .status()
                                    .await;
                                if status.is_err() {
                                    return Ok(ExitStatus::default());
                                }
                            }
                            Some(BackendInput::Drain(tx)) => {
                                let _ = tx.send(());
                            }
                            None => return Ok(ExitStatus::default()),
                        }
                    }
                    resize = resize_rx.recv() => {
                        if let Some((cols, rows)) = resize {
                            let _ = self.tmux_async_cmd()
                                .args([
                                    "resize-pane", "-t", &self.target,
                                    "-x", &cols.to_string(), "-y", &rows.to_string(),
                                ])
                                .stdout(std::process::Stdio::null())
                                .stderr(std::process::Stdio::null())
                                .status()
                                .await;
                        }
                    }
                }
            }
        })
    }

    fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let status = self
            .tmux_cmd()
            .args(["resize-pane", "-t", &self.target, "-x", &cols.to_string(), "-y", &rows.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()?;
        if !status.success() {
            anyhow::bail!("tmux resize-pane failed");
        }
        Ok(())
    }

    fn child_pid(&self) -> Option<u32> {
        let output = self
            .tmux_cmd()
            .args(["display-message", "-p", "-t", &self.target, "#{pane_pid}"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

/// Session names accepted by tmux mode, per spec §4.3.
pub fn valid_tmux_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;

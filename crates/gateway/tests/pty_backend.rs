// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the native PTY backend and the Session task built
//! on top of it, independent of the HTTP/WS transport layer.

use std::path::PathBuf;
use std::time::Duration;

use shellgate::pty::spawn::NativePty;
use shellgate::pty::Backend;
use shellgate::session::{Session, SessionConfig, SessionMode, ViewerKind};

#[tokio::test]
async fn native_pty_runs_command_and_reports_clean_exit() {
    let backend = NativePty::spawn(&["echo".into(), "hello-pty".into()], None, 80, 24, &[]).expect("spawn echo");
    let config = SessionConfig::new("pty-echo", "tester", SessionMode::Shell, PathBuf::from("/"), 80, 24, backend);
    let handle = Session::spawn(config);

    let attachment = handle.attach_raw().await.expect("attach raw");
    let mut rx = attachment.rx;

    let mut collected = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(bytes)) => collected.extend_from_slice(&bytes),
            Ok(None) => break,
            Err(_) => break,
        }
    }
    assert!(String::from_utf8_lossy(&collected).contains("hello-pty"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.is_closed(), "session should close once its backend process exits");
}

#[tokio::test]
async fn native_pty_resize_is_idempotent() {
    let backend = NativePty::spawn(&["cat".into()], None, 80, 24, &[]).expect("spawn cat");
    backend.resize(80, 24).expect("resize to the same size is a no-op");
    backend.resize(120, 40).expect("resize to a new size succeeds");
}

#[tokio::test]
async fn session_write_is_echoed_back_through_cat() {
    let backend = NativePty::spawn(&["cat".into()], None, 80, 24, &[]).expect("spawn cat");
    let config = SessionConfig::new("pty-cat", "tester", SessionMode::Shell, PathBuf::from("/"), 80, 24, backend);
    let handle = Session::spawn(config);

    let attachment = handle.attach_raw().await.expect("attach raw");
    let mut rx = attachment.rx;

    handle.write(bytes::Bytes::from_static(b"roundtrip\n")).await.expect("write input");

    let mut collected = Vec::new();
    while !String::from_utf8_lossy(&collected).contains("roundtrip") {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(bytes)) => collected.extend_from_slice(&bytes),
            other => panic!("expected echoed output, got {other:?}"),
        }
    }

    handle.detach(attachment.viewer_id, ViewerKind::Raw).await;
    handle.close().await;
}

#[tokio::test]
async fn session_signal_reaches_the_child_process() {
    let backend = NativePty::spawn(&["sleep".into(), "30".into()], None, 80, 24, &[]).expect("spawn sleep");
    let config = SessionConfig::new("pty-signal", "tester", SessionMode::Shell, PathBuf::from("/"), 80, 24, backend);
    let handle = Session::spawn(config);

    handle
        .send_signal(shellgate::event::PtySignal::Int)
        .await
        .expect("deliver SIGINT");

    tokio::time::timeout(Duration::from_secs(2), async {
        while !handle.is_closed() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session should close once the signaled child exits");
}

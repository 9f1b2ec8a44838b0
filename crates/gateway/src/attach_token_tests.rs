// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn issue_then_consume_returns_the_binding() {
    let registry = AttachTokenRegistry::new(Duration::from_secs(60));
    let token = registry.issue("sess-1", "user-1", ViewerKind::Raw, Some((80, 24)));

    let binding = registry.consume(&token).expect("token should be valid");
    assert_eq!(binding.session_id, "sess-1");
    assert_eq!(binding.user_id, "user-1");
    assert_eq!(binding.cols, Some(80));
    assert_eq!(binding.rows, Some(24));
}

#[test]
fn tokens_are_single_use() {
    let registry = AttachTokenRegistry::new(Duration::from_secs(60));
    let token = registry.issue("sess-1", "user-1", ViewerKind::Chat, None);

    assert!(registry.consume(&token).is_some());
    assert!(registry.consume(&token).is_none(), "a replayed token must not redeem twice");
}

#[test]
fn unknown_token_is_rejected() {
    let registry = AttachTokenRegistry::new(Duration::from_secs(60));
    assert!(registry.consume("not-a-real-token").is_none());
}

#[test]
fn expired_token_is_rejected() {
    let registry = AttachTokenRegistry::new(Duration::from_millis(0));
    let token = registry.issue("sess-1", "user-1", ViewerKind::Raw, None);
    std::thread::sleep(Duration::from_millis(5));
    assert!(registry.consume(&token).is_none());
}

#[test]
fn sweep_expired_drops_stale_entries_without_touching_fresh_ones() {
    let registry = AttachTokenRegistry::new(Duration::from_millis(0));
    let _stale = registry.issue("sess-1", "user-1", ViewerKind::Raw, None);
    std::thread::sleep(Duration::from_millis(5));
    registry.sweep_expired();
    assert!(registry.is_empty());
}

#[test]
fn issued_tokens_are_not_trivially_guessable() {
    let registry = AttachTokenRegistry::new(Duration::from_secs(60));
    let a = registry.issue("sess-1", "user-1", ViewerKind::Raw, None);
    let b = registry.issue("sess-1", "user-1", ViewerKind::Raw, None);
    assert_ne!(a, b);
    assert!(a.len() >= 32, "expected at least 128 bits of hex-encoded entropy");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn valid_tmux_name_accepts_alnum_dot_underscore_dash() {
    assert!(valid_tmux_name("my-session_1.dev"));
    assert!(valid_tmux_name("a"));
}

#[test]
fn valid_tmux_name_rejects_empty() {
    assert!(!valid_tmux_name(""));
}

#[test]
fn valid_tmux_name_rejects_path_separators_and_whitespace() {
    assert!(!valid_tmux_name("foo/bar"));
    assert!(!valid_tmux_name("foo bar"));
    assert!(!valid_tmux_name("foo:bar"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::build_state;
use crate::config::Config;

#[test]
fn build_state_honors_policy_fields_from_config() -> anyhow::Result<()> {
    let config: Config =
        Config::try_parse_from(["shellgate", "--max-sessions-per-user", "3", "--attach-token-ttl-secs", "5"])?;
    let state = build_state(config)?;
    assert_eq!(state.config.max_sessions_per_user, 3);
    assert_eq!(state.attach_tokens.len(), 0);
    Ok(())
}

#[test]
fn build_state_defaults_to_none_authenticator() -> anyhow::Result<()> {
    let config = Config::try_parse_from(["shellgate"])?;
    let state = build_state(config)?;
    let user = state.authenticator.authenticate(&axum::http::HeaderMap::new()).unwrap();
    assert_eq!(user, "default");
    Ok(())
}

#[test]
fn build_state_rejects_basic_mode_missing_credentials() {
    let config = Config::try_parse_from(["shellgate", "--auth-mode", "basic"]).unwrap();
    assert!(build_state(config).is_err());
}

#[test]
fn build_state_rejects_non_loopback_host() {
    let config = Config::try_parse_from(["shellgate", "--host", "0.0.0.0"]).unwrap();
    assert!(build_state(config).is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Remote terminal gateway.
#[derive(Debug, Parser)]
#[command(name = "shellgate", version, about)]
pub struct Config {
    /// Address to bind to. Must be a loopback address — this gateway is
    /// designed to sit behind a trusted reverse proxy, never on the open
    /// network directly.
    #[arg(long, env = "SHELLGATE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "SHELLGATE_PORT", default_value = "7890")]
    pub port: u16,

    /// Authentication mode: none, basic, or cloudflare.
    #[arg(long, env = "SHELLGATE_AUTH_MODE", default_value = "none")]
    pub auth_mode: String,

    /// Basic-auth username (authMode=basic).
    #[arg(long, env = "SHELLGATE_BASIC_USER")]
    pub basic_user: Option<String>,

    /// Basic-auth password (authMode=basic).
    #[arg(long, env = "SHELLGATE_BASIC_PASS")]
    pub basic_pass: Option<String>,

    /// Expected Cloudflare Access JWT issuer (authMode=cloudflare).
    #[arg(long, env = "SHELLGATE_CF_ISSUER")]
    pub cf_issuer: Option<String>,

    /// Expected Cloudflare Access JWT audience (authMode=cloudflare).
    #[arg(long, env = "SHELLGATE_CF_AUDIENCE")]
    pub cf_audience: Option<String>,

    /// Enable `shell` mode sessions.
    #[arg(long, env = "SHELLGATE_ENABLE_SHELL", default_value = "true")]
    pub enable_shell: bool,

    /// Enable `node` mode sessions.
    #[arg(long, env = "SHELLGATE_ENABLE_NODE", default_value = "false")]
    pub enable_node: bool,

    /// Enable `readonly_tail` mode sessions.
    #[arg(long, env = "SHELLGATE_ENABLE_READONLY_TAIL", default_value = "true")]
    pub enable_readonly_tail: bool,

    /// Enable `tmux` mode sessions.
    #[arg(long, env = "SHELLGATE_ENABLE_TMUX", default_value = "false")]
    pub enable_tmux: bool,

    /// Default shell used for `shell` mode (falls back to $SHELL, then /bin/sh).
    #[arg(long, env = "SHELLGATE_DEFAULT_SHELL")]
    pub default_shell: Option<String>,

    /// Default working directory for new sessions.
    #[arg(long, env = "SHELLGATE_DEFAULT_CWD")]
    pub default_cwd: Option<PathBuf>,

    /// Attach-token TTL in seconds.
    #[arg(long, env = "SHELLGATE_ATTACH_TOKEN_TTL_SECS", default_value = "60")]
    pub attach_token_ttl_secs: u64,

    /// Grace period in milliseconds a detached session is kept alive for.
    #[arg(long, env = "SHELLGATE_DETACH_GRACE_MS", default_value = "300000")]
    pub detach_grace_ms: u64,

    /// Idle timeout in milliseconds before an unattached session is closed.
    #[arg(long, env = "SHELLGATE_IDLE_TIMEOUT_MS", default_value = "3600000")]
    pub idle_timeout_ms: u64,

    /// Maximum concurrent sessions per user.
    #[arg(long, env = "SHELLGATE_MAX_SESSIONS_PER_USER", default_value = "12")]
    pub max_sessions_per_user: usize,

    /// Maximum inbound WebSocket message size, in bytes.
    #[arg(long, env = "SHELLGATE_MAX_WS_MESSAGE_BYTES", default_value = "1048576")]
    pub max_ws_message_bytes: usize,

    /// Scrollback buffer size, in bytes, for the raw view.
    #[arg(long, env = "SHELLGATE_SCROLLBACK_BYTES", default_value = "1048576")]
    pub scrollback_bytes: usize,

    /// Chat ring buffer capacity, in events.
    #[arg(long, env = "SHELLGATE_CHAT_RING_CAPACITY", default_value = "1000")]
    pub chat_ring_capacity: usize,

    /// StreamShaper quiet-flush delay, in milliseconds.
    #[arg(long, env = "SHELLGATE_QUIET_FLUSH_MS", default_value = "200")]
    pub quiet_flush_ms: u64,

    /// StreamShaper max lines accumulated before a forced flush.
    #[arg(long, env = "SHELLGATE_MAX_LINES_FLUSH", default_value = "80")]
    pub max_lines_flush: usize,

    /// tmux session-name prefix applied to all tmux-mode sessions.
    #[arg(long, env = "SHELLGATE_TMUX_PREFIX", default_value = "shellgate-")]
    pub tmux_prefix: String,

    /// Path to the newline-delimited-JSON audit log. Unset logs audit events
    /// via `tracing` instead of to a dedicated file.
    #[arg(long, env = "SHELLGATE_AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// Log format: json or text.
    #[arg(long, env = "SHELLGATE_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SHELLGATE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Parsed, validated authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Basic,
    Cloudflare,
}

impl Config {
    /// Validate the configuration after parsing. This gateway must never be
    /// reachable directly off the loopback interface; callers are expected
    /// to run it behind a reverse proxy that terminates TLS and enforces
    /// network-level access control.
    pub fn validate(&self) -> anyhow::Result<()> {
        let addr: IpAddr = self
            .host
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid --host address: {}", self.host))?;
        if !addr.is_loopback() {
            anyhow::bail!(
                "refusing to bind non-loopback address {addr}: this gateway must run behind a \
                 trusted reverse proxy, not directly on the network"
            );
        }

        let mode = self.auth_mode_enum()?;
        if mode == AuthMode::Basic && (self.basic_user.is_none() || self.basic_pass.is_none()) {
            anyhow::bail!("authMode=basic requires --basic-user and --basic-pass");
        }
        if mode == AuthMode::Cloudflare && (self.cf_issuer.is_none() || self.cf_audience.is_none()) {
            anyhow::bail!("authMode=cloudflare requires --cf-issuer and --cf-audience");
        }

        Ok(())
    }

    pub fn auth_mode_enum(&self) -> anyhow::Result<AuthMode> {
        match self.auth_mode.to_lowercase().as_str() {
            "none" => Ok(AuthMode::None),
            "basic" => Ok(AuthMode::Basic),
            "cloudflare" => Ok(AuthMode::Cloudflare),
            other => anyhow::bail!("invalid auth mode: {other}"),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        let ip: IpAddr = self.host.parse()?;
        Ok(std::net::SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tungstenite::http::Uri;

use super::defaults::{
    EVENT_STREAM_PATH, MAX_HEARTBEAT_MS, MAX_HTTP_TIMEOUT_MS, MAX_ONLINE_WINDOW_MS, MAX_POLL_MS,
    MAX_RECONNECT_MS, MAX_RUNNER_CHARS, MIN_HEARTBEAT_MS, MIN_HTTP_TIMEOUT_MS,
    MIN_ONLINE_WINDOW_MS, MIN_POLL_MS, MIN_RECONNECT_MS, STREAM_READ_TIMEOUT_MS,
};
use super::AppConfig;
use crate::capture::{MAX_TARGET_COUNT, MIN_TARGET_COUNT};
use crate::client::StreamSettings;
use crate::events::{MAX_EVENT_LOG_CAPACITY, MIN_EVENT_LOG_CAPACITY};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize URLs.
    pub fn validate(&mut self) -> Result<()> {
        check_range("--poll-ms", self.poll_ms, MIN_POLL_MS, MAX_POLL_MS)?;
        check_range(
            "--online-window-ms",
            self.online_window_ms,
            MIN_ONLINE_WINDOW_MS,
            MAX_ONLINE_WINDOW_MS,
        )?;
        check_range(
            "--heartbeat-ms",
            self.heartbeat_ms,
            MIN_HEARTBEAT_MS,
            MAX_HEARTBEAT_MS,
        )?;
        check_range(
            "--reconnect-ms",
            self.reconnect_ms,
            MIN_RECONNECT_MS,
            MAX_RECONNECT_MS,
        )?;
        check_range(
            "--http-timeout-ms",
            self.http_timeout_ms,
            MIN_HTTP_TIMEOUT_MS,
            MAX_HTTP_TIMEOUT_MS,
        )?;
        if !(MIN_EVENT_LOG_CAPACITY..=MAX_EVENT_LOG_CAPACITY).contains(&self.event_log_capacity) {
            bail!(
                "--event-log-capacity must be between {MIN_EVENT_LOG_CAPACITY} and {MAX_EVENT_LOG_CAPACITY}, got {}",
                self.event_log_capacity
            );
        }
        if !(MIN_TARGET_COUNT..=MAX_TARGET_COUNT).contains(&self.target_count) {
            bail!(
                "--target-count must be between {MIN_TARGET_COUNT} and {MAX_TARGET_COUNT}, got {}",
                self.target_count
            );
        }

        self.runner = self.runner.trim().to_string();
        if self.runner.chars().count() > MAX_RUNNER_CHARS {
            bail!("--runner must be at most {MAX_RUNNER_CHARS} characters");
        }
        if self.runner.chars().any(char::is_control) {
            bail!("--runner must not contain control characters");
        }

        self.api_base = normalize_url("--api-base", &self.api_base, &["http", "https"])?;
        if let Some(url) = &self.ws_url {
            self.ws_url = Some(normalize_url("--ws-url", url, &["ws"])?);
        }
        Ok(())
    }

    /// Event feed URL, derived from the API host when not given explicitly.
    pub fn event_stream_url(&self) -> Result<String> {
        if let Some(url) = &self.ws_url {
            return Ok(url.clone());
        }
        let uri: Uri = self
            .api_base
            .parse()
            .with_context(|| format!("invalid --api-base '{}'", self.api_base))?;
        let authority = uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .with_context(|| format!("--api-base '{}' has no host", self.api_base))?;
        Ok(format!("ws://{authority}{EVENT_STREAM_PATH}"))
    }

    pub fn stream_settings(&self) -> Result<StreamSettings> {
        Ok(StreamSettings {
            url: self.event_stream_url()?,
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            reconnect_base: Duration::from_millis(self.reconnect_ms),
            reconnect_max: Duration::from_millis(MAX_RECONNECT_MS),
            connect_timeout: self.http_timeout(),
            read_timeout: Duration::from_millis(STREAM_READ_TIMEOUT_MS),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// True when either debug or timing logs were requested and not vetoed.
    pub fn logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }
}

fn check_range(flag: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if !(min..=max).contains(&value) {
        bail!("{flag} must be between {min} and {max}, got {value}");
    }
    Ok(())
}

/// Require one of `schemes` and a host; strip trailing slashes.
pub(super) fn normalize_url(flag: &str, raw: &str, schemes: &[&str]) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    let uri: Uri = trimmed
        .parse()
        .with_context(|| format!("{flag} '{trimmed}' is not a valid URL"))?;
    let scheme = uri.scheme_str().unwrap_or("");
    if !schemes.iter().any(|allowed| allowed.eq_ignore_ascii_case(scheme)) {
        bail!("{flag} must use one of {schemes:?}, got '{trimmed}'");
    }
    if uri.host().map_or(true, str::is_empty) {
        bail!("{flag} '{trimmed}' has no host");
    }
    Ok(trimmed.to_string())
}

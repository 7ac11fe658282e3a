//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::Parser;

use crate::model::Mode;
use defaults::DEFAULT_API_BASE;
pub use defaults::{
    DEFAULT_EVENT_LOG_CAPACITY, DEFAULT_HEARTBEAT_MS, DEFAULT_HTTP_TIMEOUT_MS,
    DEFAULT_ONLINE_WINDOW_MS, DEFAULT_POLL_MS, DEFAULT_RECONNECT_MS, DEFAULT_TARGET_COUNT,
};

/// CLI options for the cone fleet dashboard. Every flag also reads a `CONEWATCH_*` variable.
#[derive(Debug, Parser, Clone)]
#[command(name = "conewatch", about = "Cone fleet monitoring dashboard", author, version)]
pub struct AppConfig {
    /// Base URL of the device/run service
    #[arg(long = "api-base", env = "CONEWATCH_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Event feed URL (defaults to ws://<api host>/ws/events)
    #[arg(long = "ws-url", env = "CONEWATCH_WS_URL")]
    pub ws_url: Option<String>,

    /// Device poll period (milliseconds)
    #[arg(long = "poll-ms", env = "CONEWATCH_POLL_MS", default_value_t = DEFAULT_POLL_MS)]
    pub poll_ms: u64,

    /// A device is offline once its last heartbeat is this old (milliseconds)
    #[arg(
        long = "online-window-ms",
        env = "CONEWATCH_ONLINE_WINDOW_MS",
        default_value_t = DEFAULT_ONLINE_WINDOW_MS
    )]
    pub online_window_ms: u64,

    /// Number of event log entries kept (newest first)
    #[arg(
        long = "event-log-capacity",
        env = "CONEWATCH_EVENT_LOG_CAPACITY",
        default_value_t = DEFAULT_EVENT_LOG_CAPACITY
    )]
    pub event_log_capacity: usize,

    /// Initial number of devices taking part in a run
    #[arg(
        long = "target-count",
        env = "CONEWATCH_TARGET_COUNT",
        default_value_t = DEFAULT_TARGET_COUNT
    )]
    pub target_count: u8,

    /// Runner name attached to saved runs
    #[arg(long, env = "CONEWATCH_RUNNER", default_value = "")]
    pub runner: String,

    /// Initial coordination mode shown before the service confirms a switch
    #[arg(long, env = "CONEWATCH_MODE", value_enum, default_value_t = Mode::Centralized)]
    pub mode: Mode,

    /// Keepalive period on the event feed (milliseconds)
    #[arg(
        long = "heartbeat-ms",
        env = "CONEWATCH_HEARTBEAT_MS",
        default_value_t = DEFAULT_HEARTBEAT_MS
    )]
    pub heartbeat_ms: u64,

    /// First reconnect delay after the feed drops; doubles per failure (milliseconds)
    #[arg(
        long = "reconnect-ms",
        env = "CONEWATCH_RECONNECT_MS",
        default_value_t = DEFAULT_RECONNECT_MS
    )]
    pub reconnect_ms: u64,

    /// Per-request HTTP timeout (milliseconds)
    #[arg(
        long = "http-timeout-ms",
        env = "CONEWATCH_HTTP_TIMEOUT_MS",
        default_value_t = DEFAULT_HTTP_TIMEOUT_MS
    )]
    pub http_timeout_ms: u64,

    /// Print environment diagnostics and exit
    #[arg(long = "doctor", default_value_t = false)]
    pub doctor: bool,

    /// Print saved runs and exit
    #[arg(long = "list-runs", default_value_t = false)]
    pub list_runs: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "CONEWATCH_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "CONEWATCH_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging runner names and event text (debug log only)
    #[arg(
        long = "log-content",
        env = "CONEWATCH_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long, env = "CONEWATCH_LOG_TIMINGS", default_value_t = false)]
    pub log_timings: bool,
}

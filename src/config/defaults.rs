pub(super) const DEFAULT_API_BASE: &str = "http://127.0.0.1:9000";
pub(super) const EVENT_STREAM_PATH: &str = "/ws/events";

pub const DEFAULT_POLL_MS: u64 = 1_000;
pub const DEFAULT_ONLINE_WINDOW_MS: u64 = 15_000;
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 500;
pub const DEFAULT_TARGET_COUNT: u8 = 2;
pub const DEFAULT_HEARTBEAT_MS: u64 = 15_000;
pub const DEFAULT_RECONNECT_MS: u64 = 2_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 3_000;

pub(super) const MIN_POLL_MS: u64 = 250;
pub(super) const MAX_POLL_MS: u64 = 60_000;
pub(super) const MIN_ONLINE_WINDOW_MS: u64 = 1_000;
pub(super) const MAX_ONLINE_WINDOW_MS: u64 = 600_000;
pub(super) const MIN_HEARTBEAT_MS: u64 = 1_000;
pub(super) const MAX_HEARTBEAT_MS: u64 = 120_000;
pub(super) const MIN_RECONNECT_MS: u64 = 100;
pub(super) const MAX_RECONNECT_MS: u64 = 30_000;
pub(super) const MIN_HTTP_TIMEOUT_MS: u64 = 100;
pub(super) const MAX_HTTP_TIMEOUT_MS: u64 = 60_000;
pub(super) const MAX_RUNNER_CHARS: usize = 64;

/// Socket read timeout for the feed worker; bounds heartbeat and teardown latency.
pub(super) const STREAM_READ_TIMEOUT_MS: u64 = 200;

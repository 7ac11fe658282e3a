//! Debug and crash logs. Both live in the temp dir so they never touch the dashboard's
//! screen. Each line names the thread that wrote it (`main`, `conewatch-input`,
//! `conewatch-devices`, ...) because device polls, the feed and the UI interleave.

use crate::config::AppConfig;
use crate::telemetry::init_tracing;
use crate::text::sanitize_display;
use chrono::{SecondsFormat, Utc};
use std::{
    env,
    ffi::OsString,
    fs, io,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

const LOG_MAX_BYTES: u64 = 2 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 128 * 1024;

/// What the debug log may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Verbosity {
    Off = 0,
    /// Ids, counts, errors; no runner names or feed text.
    Metadata = 1,
    Content = 2,
}

impl Verbosity {
    fn for_config(config: &AppConfig) -> Self {
        match (config.logging_enabled(), config.log_content) {
            (false, _) => Verbosity::Off,
            (true, false) => Verbosity::Metadata,
            (true, true) => Verbosity::Content,
        }
    }

    fn current() -> Self {
        match VERBOSITY.load(Ordering::Relaxed) {
            2 => Verbosity::Content,
            1 => Verbosity::Metadata,
            _ => Verbosity::Off,
        }
    }
}

static VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Off as u8);
static JOB_TIMINGS: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: Mutex<Option<RollingFile>> = Mutex::new(None);

pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("conewatch_tui.log")
}

/// Panic records: location and version, plus the payload only with `--log-content`.
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("conewatch_crash.log")
}

/// `conewatch_tui.log` -> `conewatch_tui.log.1`
fn rolled_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".1");
    PathBuf::from(name)
}

/// Append-only file that moves itself aside to `<name>.1` once it would exceed `cap`,
/// so the previous generation survives one roll.
struct RollingFile {
    path: PathBuf,
    file: fs::File,
    cap: u64,
    len: u64,
}

impl RollingFile {
    fn open(path: PathBuf, cap: u64) -> io::Result<Self> {
        let mut len = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
        if len >= cap {
            roll(&path)?;
            len = 0;
        }
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file,
            cap,
            len,
        })
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        let incoming = line.len() as u64;
        if self.len > 0 && self.len.saturating_add(incoming) > self.cap {
            self.file.flush()?;
            roll(&self.path)?;
            self.file = open_append(&self.path)?;
            self.len = 0;
        }
        self.file.write_all(line.as_bytes())?;
        self.len = self.len.saturating_add(incoming);
        Ok(())
    }
}

fn roll(path: &Path) -> io::Result<()> {
    let rolled = rolled_path(path);
    let _ = fs::remove_file(&rolled);
    fs::rename(path, rolled)
}

fn open_append(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().create(true).append(true).open(path)
}

fn thread_label() -> String {
    thread::current().name().unwrap_or("unnamed").to_string()
}

fn format_line(thread: &str, msg: &str) -> String {
    format!(
        "{} [{thread}] {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        sanitize_display(msg)
    )
}

/// Apply `--logs`/`--no-logs`/`--log-content`/`--log-timings`, open the debug log and
/// start the JSON trace subscriber.
pub fn init_logging(config: &AppConfig) {
    let verbosity = Verbosity::for_config(config);
    VERBOSITY.store(verbosity as u8, Ordering::Relaxed);
    JOB_TIMINGS.store(
        verbosity > Verbosity::Off && config.log_timings,
        Ordering::Relaxed,
    );

    let writer = if verbosity > Verbosity::Off {
        RollingFile::open(log_file_path(), LOG_MAX_BYTES).ok()
    } else {
        None
    };
    *DEBUG_LOG
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = writer;
    init_tracing(config);
}

pub fn log_debug(msg: &str) {
    if Verbosity::current() < Verbosity::Metadata {
        return;
    }
    let line = format_line(&thread_label(), msg);
    let mut guard = DEBUG_LOG
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(writer) = guard.as_mut() {
        let _ = writer.append(&line);
    }
}

/// For lines carrying runner names or feed text; dropped unless `--log-content`.
pub fn log_debug_content(msg: &str) {
    if Verbosity::current() < Verbosity::Content {
        return;
    }
    log_debug(msg);
}

/// Round-trip time of a background job (`--log-timings`).
pub fn log_job_timing(job: &str, elapsed: Duration) {
    if !JOB_TIMINGS.load(Ordering::Relaxed) {
        return;
    }
    log_debug(&format!("{job} job took {} ms", elapsed.as_millis()));
}

pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    let verbosity = Verbosity::current();
    if verbosity == Verbosity::Off {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if verbosity == Verbosity::Content {
        info.payload()
            .downcast_ref::<&str>()
            .map(|text| (*text).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string())
    } else {
        "payload omitted".to_string()
    };
    let line = format_line(
        &thread_label(),
        &format!(
            "panic at {location}: {payload} (conewatch v{})",
            env!("CARGO_PKG_VERSION")
        ),
    );
    let _ = RollingFile::open(crash_log_path(), CRASH_LOG_MAX_BYTES)
        .and_then(|mut crash_log| crash_log.append(&line));
}

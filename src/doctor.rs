use crate::client::{DashboardApi, HttpApi};
use crate::{config::AppConfig, crash_log_path, log_file_path};
use crossterm::terminal::{size as terminal_size, supports_keyboard_enhancement};
use std::{env, fmt::Display};

pub struct DoctorReport {
    lines: Vec<String>,
}

impl DoctorReport {
    pub fn new(title: &str) -> Self {
        Self {
            lines: vec![title.to_string()],
        }
    }

    pub fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("{title}:"));
    }

    pub fn push_kv(&mut self, key: &str, value: impl Display) {
        self.lines.push(format!("  {key}: {value}"));
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Terminal and config diagnostics. Touches the network only when `probe_service` is set.
pub fn doctor_report(config: &AppConfig, binary_name: &str, probe_service: bool) -> DoctorReport {
    let mut report = DoctorReport::new("Conewatch Doctor");
    report.push_kv("version", env!("CARGO_PKG_VERSION"));
    report.push_kv("binary", binary_name);
    report.push_kv("os", format!("{}/{}", env::consts::OS, env::consts::ARCH));

    let mut validated = config.clone();
    let validation_result = validated.validate();
    let resolved = validation_result
        .as_ref()
        .map(|_| &validated)
        .unwrap_or(config);

    report.section("Terminal");
    match terminal_size() {
        Ok((cols, rows)) => report.push_kv("size", format!("{cols}x{rows}")),
        Err(err) => report.push_kv("size", format!("error: {err}")),
    }
    if let Ok(term) = env::var("TERM") {
        report.push_kv("term", term);
    }
    if let Ok(term_program) = env::var("TERM_PROGRAM") {
        let version = env::var("TERM_PROGRAM_VERSION").unwrap_or_else(|_| "unknown".to_string());
        report.push_kv("term_program", format!("{term_program} ({version})"));
    }
    report.push_kv("color_mode", detect_color_mode());
    report.push_kv("unicode", detect_unicode_support());
    report.push_kv(
        "key_event_kinds",
        match supports_keyboard_enhancement() {
            Ok(true) => "reported (repeat presses filtered by kind)".to_string(),
            Ok(false) => "press only (auto-repeat indistinguishable from presses)".to_string(),
            Err(err) => format!("unknown: {err}"),
        },
    );

    report.section("Config");
    match &validation_result {
        Ok(()) => report.push_kv("validation", "ok"),
        Err(err) => report.push_kv("validation", format!("error: {err}")),
    }
    report.push_kv("api_base", &resolved.api_base);
    match resolved.event_stream_url() {
        Ok(url) => report.push_kv("event_stream", url),
        Err(err) => report.push_kv("event_stream", format!("error: {err}")),
    }
    report.push_kv("poll_ms", resolved.poll_ms);
    report.push_kv("online_window_ms", resolved.online_window_ms);
    report.push_kv("event_log_capacity", resolved.event_log_capacity);
    report.push_kv("target_count", resolved.target_count);
    report.push_kv("mode", resolved.mode.as_str());
    report.push_kv("heartbeat_ms", resolved.heartbeat_ms);
    report.push_kv("reconnect_ms", resolved.reconnect_ms);
    report.push_kv(
        "logs",
        if resolved.logging_enabled() {
            "enabled"
        } else {
            "disabled"
        },
    );
    report.push_kv(
        "log_content",
        if resolved.log_content {
            "enabled"
        } else {
            "disabled"
        },
    );
    report.push_kv("log_file", log_file_path().display());
    report.push_kv("crash_log", crash_log_path().display());

    if probe_service && validation_result.is_ok() {
        report.section("Service");
        probe(&mut report, resolved);
    }

    report
}

fn probe(report: &mut DoctorReport, config: &AppConfig) {
    let api = match HttpApi::new(&config.api_base, config.http_timeout()) {
        Ok(api) => api,
        Err(err) => {
            report.push_kv("client", format!("error: {err:#}"));
            return;
        }
    };
    match api.fetch_devices() {
        Ok(devices) => {
            report.push_kv("device_count", devices.len());
            for device in devices {
                report.push_line(format!("    - {} ({})", device.display_name(), device.id));
            }
        }
        Err(err) => report.push_kv("devices", format!("error: {err:#}")),
    }
    match api.fetch_runs() {
        Ok(runs) => report.push_kv("saved_runs", runs.len()),
        Err(err) => report.push_kv("saved_runs", format!("error: {err:#}")),
    }
}

fn detect_color_mode() -> String {
    if env::var("NO_COLOR").is_ok() {
        return "none (NO_COLOR)".to_string();
    }
    if let Ok(colorterm) = env::var("COLORTERM") {
        let value = colorterm.to_lowercase();
        if value == "truecolor" || value == "24bit" {
            return format!("truecolor (COLORTERM={colorterm})");
        }
    }
    if let Ok(term) = env::var("TERM") {
        let value = term.to_lowercase();
        if value.contains("256color") || value.contains("256-color") {
            return format!("256 (TERM={term})");
        }
        if value == "dumb" {
            return "none (TERM=dumb)".to_string();
        }
        if value.contains("color") || value.contains("xterm") || value.contains("screen") {
            return format!("ansi (TERM={term})");
        }
    }
    "ansi (default)".to_string()
}

fn detect_unicode_support() -> String {
    for key in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(value) = env::var(key) {
            let upper = value.to_ascii_uppercase();
            if upper.contains("UTF-8") || upper.contains("UTF8") {
                return format!("likely ({key}={value})");
            }
            return format!("unknown ({key}={value})");
        }
    }
    "unknown (locale env not set)".to_string()
}

//! Wire and domain types shared by the dashboard, the HTTP client, and the renderer.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coordination architecture the fleet is running under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Centralized,
    Decentralized,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Centralized => "centralized",
            Mode::Decentralized => "decentralized",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Centralized => Mode::Decentralized,
            Mode::Decentralized => Mode::Centralized,
        }
    }
}

/// One cone as reported by the device service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub rssi: Option<f64>,
    #[serde(default)]
    pub signal: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
    /// Epoch milliseconds of the last heartbeat; `None` when never seen.
    #[serde(
        default,
        rename = "last_seen",
        deserialize_with = "deserialize_last_seen"
    )]
    pub last_seen_ms: Option<i64>,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            model: None,
            ip: None,
            rssi: None,
            signal: None,
            status: None,
            mode: None,
            connection: None,
            last_seen_ms: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.id)
    }

    /// A device is online while its last heartbeat is strictly younger than the window.
    pub fn is_online(&self, now_ms: i64, window_ms: u64) -> bool {
        let Some(last_seen) = self.last_seen_ms else {
            return false;
        };
        let age = now_ms.saturating_sub(last_seen);
        age < i64::try_from(window_ms).unwrap_or(i64::MAX)
    }

    /// Signal strength mapped from dBm to 0..=100 (-90 dBm is empty, -40 dBm is full).
    pub fn signal_percent(&self) -> Option<u8> {
        let dbm = self.rssi.or(self.signal)?;
        if !dbm.is_finite() {
            return None;
        }
        Some(((dbm + 90.0) * 2.0).round().clamp(0.0, 100.0) as u8)
    }
}

fn deserialize_last_seen<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp_ms))
}

/// Accepts epoch milliseconds or an RFC 3339 / naive ISO string (naive values are UTC).
pub fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.timestamp_millis());
            }
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

/// Decode a device list body; the service may answer with an array or an id-keyed map.
/// Entries that do not decode are skipped and written to the debug log.
pub fn parse_devices(body: Value) -> Result<Vec<Device>> {
    let items: Vec<Value> = match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .map(|(key, mut item)| {
                if let Value::Object(fields) = &mut item {
                    fields.entry("id").or_insert(Value::String(key));
                }
                item
            })
            .collect(),
        Value::Null => Vec::new(),
        other => bail!("device list must be an array or object, got {other}"),
    };
    let mut devices = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Device>(item) {
            Ok(device) => devices.push(device),
            Err(err) => crate::log_debug(&format!("skipping device entry: {err}")),
        }
    }
    Ok(devices)
}

/// How an Event Log entry should be colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" => Some(Severity::Success),
            "info" | "debug" => Some(Severity::Info),
            "warning" | "warn" => Some(Severity::Warning),
            "error" | "critical" | "fatal" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub timestamp: String,
    pub device_ref: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl EventLogEntry {
    /// Entry raised by the dashboard itself rather than the feed.
    pub fn local(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: format_timestamp(Utc::now()),
            device_ref: None,
            message: message.into(),
            severity,
        }
    }
}

/// One captured timestamp in the live session.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub device_id: String,
    pub device_label: String,
}

impl Stamp {
    pub fn to_payload(&self) -> StampPayload {
        StampPayload {
            device_id: self.device_id.clone(),
            device_label: self.device_label.clone(),
            ts_iso: format_timestamp(self.at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampPayload {
    pub device_id: String,
    pub device_label: String,
    pub ts_iso: String,
}

/// Body of a save request handed to the run archive service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveRunRequest {
    pub runner: String,
    pub mode: Mode,
    pub stamps: Vec<StampPayload>,
}

/// A persisted run as returned by the archive service. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub runner: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub cone1_id: Option<String>,
    #[serde(default)]
    pub cone1_ts: Option<String>,
    #[serde(default)]
    pub cone2_id: Option<String>,
    #[serde(default)]
    pub cone2_ts: Option<String>,
    #[serde(default)]
    pub stamps: Vec<StampPayload>,
}

impl RunSummary {
    /// Device/timestamp pairs for display, preferring the full stamp list when present.
    pub fn marks(&self) -> Vec<(String, String)> {
        if !self.stamps.is_empty() {
            return self
                .stamps
                .iter()
                .map(|stamp| (stamp.device_label.clone(), stamp.ts_iso.clone()))
                .collect();
        }
        [
            (&self.cone1_id, &self.cone1_ts),
            (&self.cone2_id, &self.cone2_ts),
        ]
        .into_iter()
        .filter_map(|(id, ts)| Some((id.clone()?, ts.clone().unwrap_or_default())))
        .collect()
    }
}

/// Acknowledgement body of a mode switch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModeAck {
    #[serde(default = "default_ok")]
    pub ok: bool,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_ok() -> bool {
    true
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! Event feed merger: folds stream batches into a bounded, newest-first Event Log and
//! tells the caller when a device refresh is due (once per batch, never per item).


use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{format_timestamp, EventLogEntry, Severity};
use crate::text::sanitize_display;

pub const MIN_EVENT_LOG_CAPACITY: usize = 50;
pub const MAX_EVENT_LOG_CAPACITY: usize = 500;

/// Bounded most-recent-first sequence of entries; the oldest entries fall off the end.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventLogEntry>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_EVENT_LOG_CAPACITY, MAX_EVENT_LOG_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Put a whole batch at the head, keeping the batch's own order.
    pub fn prepend_batch(&mut self, batch: Vec<EventLogEntry>) {
        for entry in batch.into_iter().rev() {
            self.entries.push_front(entry);
        }
        self.entries.truncate(self.capacity);
    }

    pub fn push(&mut self, entry: EventLogEntry) {
        self.prepend_batch(vec![entry]);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.entries.iter()
    }
}

/// What a single stream frame amounted to.
#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A batch was folded in; the caller must trigger exactly one device refresh.
    Batch { added: usize },
    /// Well-formed frame of a type the dashboard does not consume.
    Ignored,
    /// Unparsable frame; dropped without touching the log.
    Malformed { reason: String },
}

impl MergeOutcome {
    pub fn wants_refresh(&self) -> bool {
        matches!(self, MergeOutcome::Batch { .. })
    }
}

#[derive(Debug, Default)]
pub struct EventStreamMerger {
    batches: u64,
    malformed: u64,
}

impl EventStreamMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw text frame from the feed into `log`.
    pub fn ingest(
        &mut self,
        log: &mut EventLog,
        frame: &str,
        received_at: DateTime<Utc>,
    ) -> MergeOutcome {
        let value: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(err) => {
                self.malformed += 1;
                return MergeOutcome::Malformed {
                    reason: format!("invalid JSON: {err}"),
                };
            }
        };
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            self.malformed += 1;
            return MergeOutcome::Malformed {
                reason: "frame has no type".to_string(),
            };
        };
        if kind != "events" {
            return MergeOutcome::Ignored;
        }
        let Some(Value::Array(items)) = value.get("data") else {
            self.malformed += 1;
            return MergeOutcome::Malformed {
                reason: "events frame without data array".to_string(),
            };
        };
        let batch: Vec<EventLogEntry> = items
            .iter()
            .map(|item| normalize_item(item, received_at))
            .collect();
        let added = batch.len();
        log.prepend_batch(batch);
        self.batches += 1;
        MergeOutcome::Batch { added }
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

/// Turn one heterogeneous feed item into a log entry.
pub fn normalize_item(item: &Value, received_at: DateTime<Utc>) -> EventLogEntry {
    let fallback_ts = format_timestamp(received_at);
    let Value::Object(fields) = item else {
        return EventLogEntry {
            timestamp: fallback_ts,
            device_ref: None,
            message: sanitize_display(&item.to_string()),
            severity: Severity::Info,
        };
    };
    let str_field = |key: &str| fields.get(key).and_then(Value::as_str);
    let data = fields.get("data");

    let timestamp = str_field("ts")
        .map(sanitize_display)
        .filter(|ts| !ts.is_empty())
        .unwrap_or(fallback_ts);
    let device_ref = str_field("cone_id")
        .or_else(|| str_field("device"))
        .or_else(|| data.and_then(|d| d.get("id")).and_then(Value::as_str))
        .map(sanitize_display)
        .filter(|id| !id.is_empty());
    let kind = str_field("t");
    let message = str_field("msg")
        .or_else(|| str_field("message"))
        .map(str::to_string)
        .or_else(|| match (kind, data) {
            (Some("error"), Some(Value::String(text))) => Some(text.clone()),
            (Some(kind), _) => Some(kind.to_string()),
            (None, Some(data)) => Some(data.to_string()),
            (None, None) => None,
        })
        .map(|text| sanitize_display(&text))
        .unwrap_or_default();
    let severity = str_field("severity")
        .or_else(|| str_field("level"))
        .and_then(Severity::parse)
        .unwrap_or(if kind == Some("error") {
            Severity::Error
        } else {
            Severity::Info
        });

    EventLogEntry {
        timestamp,
        device_ref,
        message,
        severity,
    }
}

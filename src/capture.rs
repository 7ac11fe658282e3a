//! Capture Session: the live, unsaved run being timed.
//!
//! Stamps are append-only within a session and only ever cleared in bulk (discard,
//! successful save, mode change, new session). Direct capture looks a device up by
//! position in the usable list (the snapshot truncated to the target count); sequential
//! capture walks that list with a wrapping cursor that is re-checked against the live
//! usable count on every use.
//!
//! Labels embed the 1-based position at capture time. If devices reorder between
//! captures the older labels are not rewritten.

use chrono::{DateTime, Utc};

use crate::model::{Device, Mode, SaveRunRequest, Stamp};

pub const MIN_TARGET_COUNT: u8 = 1;
pub const MAX_TARGET_COUNT: u8 = 9;

#[derive(Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded { index: usize, device_id: String },
    /// No device at that position; expected during device churn.
    NoDevice,
    /// A save for this session is in flight; stamps are frozen until it resolves.
    SaveInFlight,
}

/// Result of resolving an in-flight save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResolution {
    /// The saved session was still live and has been cleared; a new session began.
    Cleared,
    /// The session had already been replaced (mode change or new session).
    Superseded,
    /// The save failed; pending stamps are kept for a retry.
    Retained,
}

#[derive(Debug)]
pub struct CaptureSession {
    session_id: u64,
    target_count: u8,
    stamps: Vec<Stamp>,
    next_index: usize,
    saving: Option<u64>,
}

impl CaptureSession {
    pub fn new(target_count: u8) -> Self {
        Self {
            session_id: 1,
            target_count: target_count.clamp(MIN_TARGET_COUNT, MAX_TARGET_COUNT),
            stamps: Vec::new(),
            next_index: 0,
            saving: None,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn target_count(&self) -> u8 {
        self.target_count
    }

    pub fn stamps(&self) -> &[Stamp] {
        &self.stamps
    }

    pub fn has_stamps(&self) -> bool {
        !self.stamps.is_empty()
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn is_saving(&self) -> bool {
        self.saving == Some(self.session_id)
    }

    /// Returns true when the value actually changed.
    pub fn set_target_count(&mut self, count: u8) -> bool {
        let count = count.clamp(MIN_TARGET_COUNT, MAX_TARGET_COUNT);
        let changed = count != self.target_count;
        self.target_count = count;
        changed
    }

    pub fn usable<'a>(&self, devices: &'a [Device]) -> &'a [Device] {
        let limit = usize::from(self.target_count).min(devices.len());
        &devices[..limit]
    }

    pub fn usable_count(&self, devices: &[Device]) -> usize {
        self.usable(devices).len()
    }

    /// Stamp the device at `index` of the usable list. Missing devices are a silent no-op.
    pub fn record(&mut self, devices: &[Device], index: usize, at: DateTime<Utc>) -> RecordOutcome {
        if self.is_saving() {
            return RecordOutcome::SaveInFlight;
        }
        let Some(device) = self.usable(devices).get(index) else {
            return RecordOutcome::NoDevice;
        };
        self.stamps.push(Stamp {
            at,
            device_id: device.id.clone(),
            device_label: format!("{}. {}", index + 1, device.id),
        });
        RecordOutcome::Recorded {
            index,
            device_id: device.id.clone(),
        }
    }

    /// Stamp the device under the cursor, then advance the cursor modulo the usable count.
    pub fn record_sequential(&mut self, devices: &[Device], at: DateTime<Utc>) -> RecordOutcome {
        let usable = self.usable_count(devices);
        if usable == 0 {
            return RecordOutcome::NoDevice;
        }
        if self.next_index >= usable {
            self.next_index %= usable;
        }
        let outcome = self.record(devices, self.next_index, at);
        if matches!(outcome, RecordOutcome::Recorded { .. }) {
            self.next_index = (self.next_index + 1) % usable;
        }
        outcome
    }

    /// Drop all pending stamps. Refused while a save is in flight.
    pub fn discard(&mut self) -> bool {
        if self.is_saving() {
            return false;
        }
        self.clear();
        true
    }

    /// Package the pending stamps for the archive and freeze the session until resolved.
    pub fn begin_save(&mut self, runner: &str, mode: Mode) -> Option<SaveRunRequest> {
        if self.stamps.is_empty() || self.is_saving() {
            return None;
        }
        self.saving = Some(self.session_id);
        Some(SaveRunRequest {
            runner: runner.trim().to_string(),
            mode,
            stamps: self.stamps.iter().map(Stamp::to_payload).collect(),
        })
    }

    pub fn resolve_save(&mut self, session_id: u64, succeeded: bool) -> SaveResolution {
        if self.saving == Some(session_id) {
            self.saving = None;
        }
        if session_id != self.session_id {
            return SaveResolution::Superseded;
        }
        if !succeeded {
            return SaveResolution::Retained;
        }
        self.start_next_session();
        SaveResolution::Cleared
    }

    /// A mode switch always starts a fresh session, unsaved work included.
    pub fn on_mode_change(&mut self) {
        self.start_next_session();
    }

    pub fn new_session(&mut self) {
        self.start_next_session();
    }

    /// Milliseconds between the first stamp and stamp `i`.
    pub fn split_ms(&self, i: usize) -> Option<i64> {
        let first = self.stamps.first()?;
        let stamp = self.stamps.get(i)?;
        Some((stamp.at - first.at).num_milliseconds())
    }

    fn start_next_session(&mut self) {
        self.clear();
        self.saving = None;
        self.session_id += 1;
    }

    fn clear(&mut self) {
        self.stamps.clear();
        self.next_index = 0;
    }
}

//! Latest known device snapshot, fed by the poll timer and by stream-triggered refreshes.
//!
//! Fetches run off the UI thread and may complete in any order. Every fetch is issued a
//! generation number when it starts; a result is applied only if its generation is newer
//! than the one currently shown, so a slow early fetch can never overwrite a later one.

use crate::model::Device;

/// Refreshes the poll timer may keep outstanding before it skips a tick.
pub const MAX_OUTSTANDING_POLLS: usize = 4;

/// Proof that a fetch was initiated, carrying its initiation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

impl RefreshTicket {
    pub fn generation(self) -> u64 {
        self.generation
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { count: usize },
    /// A fetch initiated later has already been applied.
    Stale { generation: u64, current: u64 },
    /// The fetch failed; the previous snapshot stays in place.
    Failed,
}

#[derive(Debug, Default)]
pub struct DeviceSnapshotStore {
    devices: Vec<Device>,
    issued: u64,
    applied: u64,
    outstanding: usize,
}

impl DeviceSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.issued += 1;
        self.outstanding += 1;
        RefreshTicket {
            generation: self.issued,
        }
    }

    /// Replace the snapshot wholesale if this fetch is the newest one seen so far.
    pub fn complete_refresh<E>(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<Device>, E>,
    ) -> RefreshOutcome {
        self.outstanding = self.outstanding.saturating_sub(1);
        let devices = match result {
            Ok(devices) => devices,
            Err(_) => return RefreshOutcome::Failed,
        };
        if ticket.generation <= self.applied {
            return RefreshOutcome::Stale {
                generation: ticket.generation,
                current: self.applied,
            };
        }
        self.applied = ticket.generation;
        self.devices = devices;
        RefreshOutcome::Applied {
            count: self.devices.len(),
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Whether the poll timer should start another fetch now.
    pub fn poll_due(&self) -> bool {
        self.outstanding < MAX_OUTSTANDING_POLLS
    }

    pub fn online_count(&self, now_ms: i64, window_ms: u64) -> usize {
        self.devices
            .iter()
            .filter(|device| device.is_online(now_ms, window_ms))
            .count()
    }
}

/// Operator-facing health summary of the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetStatus {
    pub online: usize,
    pub total: usize,
}

impl FleetStatus {
    pub fn from_store(store: &DeviceSnapshotStore, now_ms: i64, window_ms: u64) -> Self {
        Self {
            online: store.online_count(now_ms, window_ms),
            total: store.devices().len(),
        }
    }

    pub fn all_online(self) -> bool {
        self.total > 0 && self.online == self.total
    }

    pub fn headline(self) -> &'static str {
        if self.all_online() {
            "ALL SYSTEMS GO"
        } else {
            "ATTENTION REQUIRED"
        }
    }
}

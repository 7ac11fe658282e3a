//! Background jobs for network calls. Jobs run on their own threads and hand a single
//! message back to the event loop; once the owning dashboard is torn down they deliver
//! nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::Error;
use crossbeam_channel::Sender;

use crate::devices::RefreshTicket;
use crate::{log_debug, log_job_timing};
use crate::model::{Device, Mode, ModeAck, RunSummary};

/// Liveness flag shared by a dashboard instance and every worker it spawned.
#[derive(Debug, Clone)]
pub struct Lifetime {
    alive: Arc<AtomicBool>,
}

impl Lifetime {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn end(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion of one background job.
#[derive(Debug)]
pub enum WorkerMessage {
    Devices {
        ticket: RefreshTicket,
        result: Result<Vec<Device>, Error>,
    },
    ModeSwitched {
        target: Mode,
        result: Result<ModeAck, Error>,
    },
    RunSaved {
        session_id: u64,
        result: Result<RunSummary, Error>,
    },
    RunsLoaded(Result<Vec<RunSummary>, Error>),
    TargetPublished {
        count: u8,
        result: Result<(), Error>,
    },
}

impl WorkerMessage {
    pub fn label(&self) -> &'static str {
        match self {
            WorkerMessage::Devices { .. } => "devices",
            WorkerMessage::ModeSwitched { .. } => "mode",
            WorkerMessage::RunSaved { .. } => "save",
            WorkerMessage::RunsLoaded(_) => "runs",
            WorkerMessage::TargetPublished { .. } => "target",
        }
    }
}

/// Run `job` off the event loop and deliver its message if the owner is still alive.
pub fn spawn_job<F>(lifetime: &Lifetime, tx: &Sender<WorkerMessage>, name: &'static str, job: F)
where
    F: FnOnce() -> WorkerMessage + Send + 'static,
{
    let lifetime = lifetime.clone();
    let tx = tx.clone();
    let spawned = thread::Builder::new()
        .name(format!("conewatch-{name}"))
        .spawn(move || {
            let started = Instant::now();
            let message = job();
            log_job_timing(name, started.elapsed());
            if !lifetime.is_alive() {
                log_debug(&format!("dropping {} result after teardown", message.label()));
                return;
            }
            let _ = tx.send(message);
        });
    if let Err(err) = spawned {
        log_debug(&format!("failed to spawn {name} job: {err}"));
    }
}

use std::sync::Arc;

use chrono::Utc;
use crossbeam_channel::Sender;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::archive::RunArchive;
use crate::capture::{CaptureSession, RecordOutcome, SaveResolution};
use crate::client::{DashboardApi, StreamEvent};
use crate::config::AppConfig;
use crate::devices::{DeviceSnapshotStore, FleetStatus, RefreshOutcome};
use crate::events::{EventLog, EventStreamMerger, MergeOutcome};
use crate::input::{DashboardAction, InputDispatcher};
use crate::mode::{ModeController, SwitchRequest};
use crate::model::{EventLogEntry, Mode, Severity};
use crate::worker::{spawn_job, Lifetime, WorkerMessage};
use crate::{log_debug, log_debug_content};

/// Longest runner name accepted from the text field.
pub const RUNNER_MAX_CHARS: usize = 64;

/// The single owner of all dashboard state. Created at startup and torn down on exit;
/// every mutation happens on the thread that owns it, one message at a time.
pub struct Dashboard {
    config: AppConfig,
    api: Arc<dyn DashboardApi>,
    lifetime: Lifetime,
    worker_tx: Sender<WorkerMessage>,
    devices: DeviceSnapshotStore,
    device_fetch_failing: bool,
    events: EventLog,
    merger: EventStreamMerger,
    session: CaptureSession,
    mode: ModeController,
    archive: RunArchive,
    runs_loading: bool,
    dispatcher: InputDispatcher,
    runner: String,
    runner_edit: Option<String>,
    status: String,
    needs_redraw: bool,
}

impl Dashboard {
    pub fn new(
        config: AppConfig,
        api: Arc<dyn DashboardApi>,
        worker_tx: Sender<WorkerMessage>,
        reports_key_release: bool,
    ) -> Self {
        Self {
            events: EventLog::new(config.event_log_capacity),
            session: CaptureSession::new(config.target_count),
            mode: ModeController::new(config.mode),
            runner: config.runner.clone(),
            dispatcher: InputDispatcher::new(reports_key_release),
            config,
            api,
            lifetime: Lifetime::new(),
            worker_tx,
            devices: DeviceSnapshotStore::new(),
            device_fetch_failing: false,
            merger: EventStreamMerger::new(),
            archive: RunArchive::new(),
            runs_loading: false,
            runner_edit: None,
            status: "Ready".to_string(),
            needs_redraw: true,
        }
    }

    /// Kick off the first device fetch and the run list load.
    pub fn start(&mut self) {
        self.request_refresh();
        self.load_runs();
    }

    /// Stop accepting results. Workers still running will deliver nothing.
    pub fn shutdown(&mut self) {
        if self.lifetime.is_alive() {
            log_debug("dashboard shutting down");
            self.lifetime.end();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.lifetime.is_alive()
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// Returns true when the operator asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        if self.runner_edit.is_some() {
            self.handle_runner_key(key);
            return false;
        }
        let Some(action) = self.dispatcher.dispatch(&key) else {
            return false;
        };
        log_debug(&format!("key action: {action:?}"));
        self.apply(action)
    }

    /// Apply one decoded operator action. Returns true for quit.
    pub fn apply(&mut self, action: DashboardAction) -> bool {
        match action {
            DashboardAction::Record(index) => self.record(Some(index)),
            DashboardAction::RecordSequential => self.record(None),
            DashboardAction::ToggleMode => self.request_mode(self.mode.current().toggled()),
            DashboardAction::TargetUp => {
                let next = self.session.target_count().saturating_add(1);
                self.set_target_count(next);
            }
            DashboardAction::TargetDown => {
                let next = self.session.target_count().saturating_sub(1);
                self.set_target_count(next);
            }
            DashboardAction::NewSession => {
                self.session.new_session();
                self.set_status(format!("Session {} started", self.session.session_id()));
            }
            DashboardAction::Discard => self.discard(),
            DashboardAction::Save => self.save(),
            DashboardAction::EditRunner => {
                self.runner_edit = Some(self.runner.clone());
                self.set_status("Editing runner name (Enter to keep, Esc to cancel)");
            }
            DashboardAction::Quit => return true,
        }
        false
    }

    fn record(&mut self, index: Option<usize>) {
        let now = Utc::now();
        let outcome = match index {
            Some(index) => self.session.record(self.devices.devices(), index, now),
            None => self.session.record_sequential(self.devices.devices(), now),
        };
        match outcome {
            RecordOutcome::Recorded { index, device_id } => {
                tracing::info!(
                    session = self.session.session_id(),
                    index,
                    device = %device_id,
                    "stamp recorded"
                );
                self.request_redraw();
            }
            RecordOutcome::SaveInFlight => {
                self.set_status("Save in progress; capture paused");
            }
            RecordOutcome::NoDevice => {}
        }
    }

    fn discard(&mut self) {
        if !self.session.has_stamps() {
            return;
        }
        if self.session.discard() {
            self.set_status("Stamps discarded");
        } else {
            self.set_status("Save in progress; nothing discarded");
        }
    }

    fn save(&mut self) {
        let session_id = self.session.session_id();
        let Some(request) = self
            .session
            .begin_save(&self.runner, self.mode.current())
        else {
            return;
        };
        tracing::info!(
            session = session_id,
            stamps = request.stamps.len(),
            mode = request.mode.as_str(),
            "save requested"
        );
        log_debug_content(&format!("saving run for runner '{}'", request.runner));
        self.set_status(format!("Saving {} stamps...", request.stamps.len()));
        let api = Arc::clone(&self.api);
        spawn_job(&self.lifetime, &self.worker_tx, "save", move || {
            WorkerMessage::RunSaved {
                session_id,
                result: api.save_run(&request),
            }
        });
    }

    /// Ask the service to switch architectures. Local state changes only on success.
    pub fn request_mode(&mut self, target: Mode) {
        match self.mode.request(target) {
            SwitchRequest::AlreadyActive => {}
            SwitchRequest::InFlight { pending } => {
                self.set_status(format!("Switch to {} still pending", pending.as_str()));
            }
            SwitchRequest::Dispatch(target) => {
                self.set_status(format!("Switching to {}...", target.as_str()));
                let api = Arc::clone(&self.api);
                spawn_job(&self.lifetime, &self.worker_tx, "mode", move || {
                    WorkerMessage::ModeSwitched {
                        target,
                        result: api.switch_mode(target),
                    }
                });
            }
        }
    }

    fn set_target_count(&mut self, count: u8) {
        if !self.session.set_target_count(count) {
            return;
        }
        let count = self.session.target_count();
        self.set_status(format!("Target devices: {count}"));
        let api = Arc::clone(&self.api);
        spawn_job(&self.lifetime, &self.worker_tx, "target", move || {
            WorkerMessage::TargetPublished {
                count,
                result: api.set_target(count),
            }
        });
    }

    fn handle_runner_key(&mut self, key: KeyEvent) {
        // Keep press/release tracking in step while the text field has focus.
        self.dispatcher.observe(&key);
        if key.kind == KeyEventKind::Release {
            return;
        }
        let Some(buffer) = self.runner_edit.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Enter => {
                let committed = buffer.trim().to_string();
                self.runner_edit = None;
                log_debug_content(&format!("runner set to '{committed}'"));
                self.runner = committed;
                self.set_status("Runner updated");
            }
            KeyCode::Esc => {
                self.runner_edit = None;
                self.set_status("Runner unchanged");
            }
            KeyCode::Backspace => {
                buffer.pop();
                self.request_redraw();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.runner_edit = None;
                self.set_status("Runner unchanged");
            }
            KeyCode::Char(ch)
                if !ch.is_control() && buffer.chars().count() < RUNNER_MAX_CHARS =>
            {
                buffer.push(ch);
                self.request_redraw();
            }
            _ => {}
        }
    }

    /// Start a device fetch. Stream batches always refresh; the timer defers to `on_tick`.
    pub fn request_refresh(&mut self) {
        let ticket = self.devices.begin_refresh();
        let api = Arc::clone(&self.api);
        spawn_job(&self.lifetime, &self.worker_tx, "devices", move || {
            WorkerMessage::Devices {
                ticket,
                result: api.fetch_devices(),
            }
        });
    }

    fn load_runs(&mut self) {
        if self.runs_loading || self.archive.is_loaded() {
            return;
        }
        self.runs_loading = true;
        let api = Arc::clone(&self.api);
        spawn_job(&self.lifetime, &self.worker_tx, "runs", move || {
            WorkerMessage::RunsLoaded(api.fetch_runs())
        });
    }

    /// Poll timer: refresh unless too many fetches are still outstanding, and retry the
    /// run list until it has loaded once.
    pub fn on_tick(&mut self) {
        if !self.is_alive() {
            return;
        }
        if self.devices.poll_due() {
            self.request_refresh();
        } else {
            log_debug(&format!(
                "skipping poll; {} fetches outstanding",
                self.devices.outstanding()
            ));
        }
        self.load_runs();
        // Liveness is a function of the clock, so the view ages even without new data.
        self.request_redraw();
    }

    pub fn handle_worker_message(&mut self, message: WorkerMessage) {
        if !self.is_alive() {
            log_debug(&format!("late {} result ignored", message.label()));
            return;
        }
        match message {
            WorkerMessage::Devices { ticket, result } => {
                let error = result.as_ref().err().map(|err| format!("{err:#}"));
                match self.devices.complete_refresh(ticket, result) {
                    RefreshOutcome::Applied { count } => {
                        tracing::debug!(
                            generation = ticket.generation(),
                            count,
                            "refresh applied"
                        );
                        if self.device_fetch_failing {
                            self.device_fetch_failing = false;
                            self.push_local(Severity::Info, "Device list reachable again");
                        }
                        self.request_redraw();
                    }
                    RefreshOutcome::Stale {
                        generation,
                        current,
                    } => {
                        tracing::debug!(generation, current, "stale refresh dropped");
                    }
                    RefreshOutcome::Failed => {
                        let reason = error.unwrap_or_default();
                        tracing::warn!(
                            generation = ticket.generation(),
                            reason = reason.as_str(),
                            "refresh failed"
                        );
                        log_debug(&format!("device fetch failed: {reason}"));
                        if !self.device_fetch_failing {
                            self.device_fetch_failing = true;
                            self.push_local(
                                Severity::Warning,
                                format!("Device refresh failed: {reason}"),
                            );
                        }
                    }
                }
            }
            WorkerMessage::ModeSwitched { target, result } => {
                let succeeded = result.is_ok();
                if self.mode.resolve(target, succeeded) {
                    self.session.on_mode_change();
                    tracing::info!(
                        mode = target.as_str(),
                        session = self.session.session_id(),
                        "mode switched"
                    );
                    self.set_status(format!("Mode: {}", target.as_str()));
                    self.push_local(
                        Severity::Success,
                        format!("Switched to {} mode", target.as_str()),
                    );
                    self.request_refresh();
                } else if let Err(err) = result {
                    tracing::warn!(
                        mode = target.as_str(),
                        error = %format!("{err:#}"),
                        "mode switch failed"
                    );
                    self.command_failed(format!("Mode switch failed: {err:#}"));
                }
            }
            WorkerMessage::RunSaved { session_id, result } => match result {
                Ok(run) => {
                    let resolution = self.session.resolve_save(session_id, true);
                    tracing::info!(
                        session = session_id,
                        run = run.id,
                        ?resolution,
                        "run saved"
                    );
                    self.set_status(format!("Run #{} saved", run.id));
                    self.push_local(Severity::Success, format!("Run #{} saved", run.id));
                    self.archive.prepend(run);
                }
                Err(err) => {
                    let resolution = self.session.resolve_save(session_id, false);
                    tracing::warn!(
                        session = session_id,
                        ?resolution,
                        error = %format!("{err:#}"),
                        "save failed"
                    );
                    let kept = if resolution == SaveResolution::Retained {
                        "; stamps kept for retry"
                    } else {
                        ""
                    };
                    self.command_failed(format!("Save failed: {err:#}{kept}"));
                }
            },
            WorkerMessage::RunsLoaded(result) => {
                self.runs_loading = false;
                match result {
                    Ok(runs) => {
                        log_debug(&format!("loaded {} saved runs", runs.len()));
                        self.archive.seed(runs);
                        self.request_redraw();
                    }
                    Err(err) => {
                        log_debug(&format!("run list load failed: {err:#}"));
                        self.push_local(
                            Severity::Warning,
                            format!("Could not load saved runs: {err:#}"),
                        );
                    }
                }
            }
            WorkerMessage::TargetPublished { count, result } => {
                if let Err(err) = result {
                    log_debug(&format!("target publish ({count}) failed: {err:#}"));
                    self.push_local(
                        Severity::Warning,
                        format!("Could not publish target count {count}: {err:#}"),
                    );
                }
            }
        }
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        if !self.is_alive() {
            return;
        }
        match event {
            StreamEvent::Connected => log_debug("event feed connected"),
            StreamEvent::Frame(frame) => {
                let outcome = self.merger.ingest(&mut self.events, &frame, Utc::now());
                match &outcome {
                    MergeOutcome::Batch { added } => {
                        tracing::debug!(added, "event batch merged");
                        self.request_redraw();
                    }
                    MergeOutcome::Ignored => {}
                    MergeOutcome::Malformed { reason } => {
                        log_debug(&format!("dropped malformed frame: {reason}"));
                    }
                }
                if outcome.wants_refresh() {
                    self.request_refresh();
                }
            }
            StreamEvent::Disconnected { reason } => {
                log_debug(&format!("event feed disconnected: {reason}"));
            }
        }
    }

    fn command_failed(&mut self, message: String) {
        log_debug(&message);
        self.push_local(Severity::Error, message.clone());
        self.set_status(message);
    }

    fn push_local(&mut self, severity: Severity, message: impl Into<String>) {
        self.events.push(EventLogEntry::local(severity, message));
        self.request_redraw();
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.request_redraw();
    }

    /// Forget which keys are down; a release seen by another window never reaches us.
    pub fn forget_held_keys(&mut self) {
        self.dispatcher.reset();
    }

    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn devices(&self) -> &DeviceSnapshotStore {
        &self.devices
    }

    pub fn fleet_status(&self, now_ms: i64) -> FleetStatus {
        FleetStatus::from_store(&self.devices, now_ms, self.config.online_window_ms)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn mode(&self) -> &ModeController {
        &self.mode
    }

    pub fn archive(&self) -> &RunArchive {
        &self.archive
    }

    pub fn runner(&self) -> &str {
        &self.runner
    }

    pub fn runner_edit(&self) -> Option<&str> {
        self.runner_edit.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

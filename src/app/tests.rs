use super::Dashboard;
use crate::client::{DashboardApi, StreamEvent};
use crate::config::AppConfig;
use crate::input::DashboardAction;
use crate::model::{Device, Mode, ModeAck, RunSummary, SaveRunRequest, Severity};
use crate::worker::WorkerMessage;
use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct FakeApi {
    devices: Mutex<Vec<Device>>,
    fail_devices: AtomicBool,
    fail_mode: AtomicBool,
    fail_save: AtomicBool,
    device_calls: AtomicUsize,
    mode_calls: AtomicUsize,
    save_calls: AtomicUsize,
    saved: Mutex<Vec<SaveRunRequest>>,
    targets: Mutex<Vec<u8>>,
    runs: Mutex<Vec<RunSummary>>,
}

impl FakeApi {
    fn with_devices(ids: &[&str]) -> Arc<Self> {
        let api = Self::default();
        *api.devices.lock().expect("lock") = ids.iter().map(|id| Device::new(*id)).collect();
        Arc::new(api)
    }
}

impl DashboardApi for FakeApi {
    fn fetch_devices(&self) -> Result<Vec<Device>> {
        self.device_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(anyhow!("GET /api/devices 503"));
        }
        Ok(self.devices.lock().expect("lock").clone())
    }

    fn switch_mode(&self, mode: Mode) -> Result<ModeAck> {
        self.mode_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(anyhow!("mode switch rejected: busy"));
        }
        Ok(ModeAck {
            ok: true,
            mode: Some(mode.as_str().to_string()),
            error: None,
        })
    }

    fn save_run(&self, request: &SaveRunRequest) -> Result<RunSummary> {
        let calls = self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(anyhow!("POST /api/runs 500"));
        }
        self.saved.lock().expect("lock").push(request.clone());
        Ok(RunSummary {
            id: 100 + calls as i64,
            created_at: "2024-05-01T12:00:00.000Z".into(),
            runner: request.runner.clone(),
            mode: request.mode.as_str().into(),
            cone1_id: None,
            cone1_ts: None,
            cone2_id: None,
            cone2_ts: None,
            stamps: request.stamps.clone(),
        })
    }

    fn fetch_runs(&self) -> Result<Vec<RunSummary>> {
        Ok(self.runs.lock().expect("lock").clone())
    }

    fn set_target(&self, count: u8) -> Result<()> {
        self.targets.lock().expect("lock").push(count);
        Ok(())
    }
}

fn dashboard(api: &Arc<FakeApi>, args: &[&str]) -> (Dashboard, Receiver<WorkerMessage>) {
    let mut argv = vec!["test-app"];
    argv.extend_from_slice(args);
    let mut config = AppConfig::parse_from(argv);
    config.validate().expect("valid config");
    let (tx, rx) = unbounded();
    let api: Arc<dyn DashboardApi> = api.clone();
    (Dashboard::new(config, api, tx, false), rx)
}

/// Feed the next worker message back into the dashboard.
fn pump(dashboard: &mut Dashboard, rx: &Receiver<WorkerMessage>) -> &'static str {
    let message = rx.recv_timeout(WAIT).expect("worker message");
    let label = message.label();
    dashboard.handle_worker_message(message);
    label
}

/// Start the dashboard with a loaded device list and run archive.
fn started(api: &Arc<FakeApi>, args: &[&str]) -> (Dashboard, Receiver<WorkerMessage>) {
    let (mut dashboard, rx) = dashboard(api, args);
    dashboard.start();
    pump(&mut dashboard, &rx);
    pump(&mut dashboard, &rx);
    assert!(dashboard.archive().is_loaded());
    (dashboard, rx)
}

fn press(code: KeyCode) -> KeyEvent {
    KeyEvent {
        code,
        modifiers: KeyModifiers::NONE,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }
}

fn stamped_ids(dashboard: &Dashboard) -> Vec<String> {
    dashboard
        .session()
        .stamps()
        .iter()
        .map(|stamp| stamp.device_id.clone())
        .collect()
}

#[test]
fn sequential_capture_wraps_at_target_and_digit_past_target_is_ignored() {
    let api = FakeApi::with_devices(&["A", "B", "C"]);
    let (mut dashboard, _rx) = started(&api, &["--target-count", "2"]);

    for _ in 0..3 {
        assert!(!dashboard.handle_key(press(KeyCode::Char(' '))));
    }
    assert!(!dashboard.handle_key(press(KeyCode::Char('3'))));

    assert_eq!(stamped_ids(&dashboard), vec!["A", "B", "A"]);
    let labels: Vec<&str> = dashboard
        .session()
        .stamps()
        .iter()
        .map(|stamp| stamp.device_label.as_str())
        .collect();
    assert_eq!(labels, vec!["1. A", "2. B", "1. A"]);
}

#[test]
fn held_key_repeats_produce_one_stamp() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, _rx) = started(&api, &[]);

    let mut repeat = press(KeyCode::Char('1'));
    dashboard.handle_key(repeat);
    repeat.kind = KeyEventKind::Repeat;
    for _ in 0..5 {
        dashboard.handle_key(repeat);
    }
    assert_eq!(dashboard.session().stamps().len(), 1);
}

#[test]
fn event_batch_triggers_exactly_one_refresh() {
    let api = FakeApi::with_devices(&["A"]);
    let (mut dashboard, rx) = started(&api, &[]);
    let calls_before = api.device_calls.load(Ordering::SeqCst);

    let frame = json!({
        "type": "events",
        "data": [
            {"msg": "one"}, {"msg": "two"}, {"msg": "three"}, {"msg": "four"}, {"msg": "five"}
        ]
    })
    .to_string();
    dashboard.handle_stream_event(StreamEvent::Frame(frame));

    assert_eq!(dashboard.events().len(), 5);
    assert_eq!(pump(&mut dashboard, &rx), "devices");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(api.device_calls.load(Ordering::SeqCst), calls_before + 1);
}

#[test]
fn malformed_frame_is_dropped_without_refresh() {
    let api = FakeApi::with_devices(&["A"]);
    let (mut dashboard, rx) = started(&api, &[]);

    dashboard.handle_stream_event(StreamEvent::Frame("{not json".into()));
    dashboard.handle_stream_event(StreamEvent::Frame(json!({"type": "hello"}).to_string()));

    assert!(dashboard.events().is_empty());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn failed_mode_switch_has_no_side_effects() {
    let api = FakeApi::with_devices(&["A", "B"]);
    api.fail_mode.store(true, Ordering::SeqCst);
    let (mut dashboard, rx) = started(&api, &[]);
    dashboard.handle_key(press(KeyCode::Char('1')));
    let session_before = dashboard.session().session_id();

    dashboard.apply(DashboardAction::ToggleMode);
    assert_eq!(pump(&mut dashboard, &rx), "mode");

    assert_eq!(dashboard.mode().current(), Mode::Centralized);
    assert_eq!(dashboard.mode().pending(), None);
    assert_eq!(dashboard.session().session_id(), session_before);
    assert_eq!(dashboard.session().stamps().len(), 1);
    assert!(dashboard.status().starts_with("Mode switch failed"));
    let newest = dashboard.events().iter().next().expect("entry");
    assert_eq!(newest.severity, Severity::Error);
}

#[test]
fn successful_mode_switch_resets_session_and_refreshes() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, rx) = started(&api, &[]);
    dashboard.handle_key(press(KeyCode::Char(' ')));
    dashboard.handle_key(press(KeyCode::Char(' ')));
    let session_before = dashboard.session().session_id();

    dashboard.request_mode(Mode::Decentralized);
    assert_eq!(pump(&mut dashboard, &rx), "mode");

    assert_eq!(dashboard.mode().current(), Mode::Decentralized);
    assert!(dashboard.session().stamps().is_empty());
    assert_eq!(dashboard.session().next_index(), 0);
    assert_eq!(dashboard.session().session_id(), session_before + 1);
    assert_eq!(pump(&mut dashboard, &rx), "devices");
}

#[test]
fn switching_to_current_mode_calls_nothing() {
    let api = FakeApi::with_devices(&["A"]);
    let (mut dashboard, rx) = started(&api, &["--mode", "decentralized"]);
    dashboard.request_mode(Mode::Decentralized);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(api.mode_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn save_success_clears_stamps_and_prepends_run() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, rx) = started(&api, &["--runner", "eric"]);
    dashboard.handle_key(press(KeyCode::Char('1')));
    dashboard.handle_key(press(KeyCode::Char('2')));
    let session_before = dashboard.session().session_id();

    dashboard.apply(DashboardAction::Save);
    assert_eq!(pump(&mut dashboard, &rx), "save");

    assert!(dashboard.session().stamps().is_empty());
    assert_eq!(dashboard.session().session_id(), session_before + 1);
    let head = dashboard.archive().runs().first().expect("run");
    assert_eq!(head.id, 100);
    assert_eq!(head.runner, "eric");
    let saved = api.saved.lock().expect("lock");
    assert_eq!(saved[0].stamps.len(), 2);
    assert_eq!(saved[0].stamps[1].device_label, "2. B");
}

#[test]
fn save_failure_keeps_stamps_for_retry() {
    let api = FakeApi::with_devices(&["A", "B"]);
    api.fail_save.store(true, Ordering::SeqCst);
    let (mut dashboard, rx) = started(&api, &[]);
    dashboard.handle_key(press(KeyCode::Char('1')));

    dashboard.apply(DashboardAction::Save);
    assert_eq!(pump(&mut dashboard, &rx), "save");

    assert_eq!(dashboard.session().stamps().len(), 1);
    assert!(!dashboard.session().is_saving());
    assert!(dashboard.archive().runs().is_empty());
    assert!(dashboard.status().contains("stamps kept"));

    api.fail_save.store(false, Ordering::SeqCst);
    dashboard.apply(DashboardAction::Save);
    assert_eq!(pump(&mut dashboard, &rx), "save");
    assert!(dashboard.session().stamps().is_empty());
    assert_eq!(dashboard.archive().runs().len(), 1);
}

#[test]
fn capture_is_paused_while_save_is_in_flight() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, rx) = started(&api, &[]);
    dashboard.handle_key(press(KeyCode::Char('1')));
    dashboard.apply(DashboardAction::Save);

    dashboard.handle_key(press(KeyCode::Char('2')));
    dashboard.apply(DashboardAction::Discard);
    assert_eq!(dashboard.session().stamps().len(), 1);

    assert_eq!(pump(&mut dashboard, &rx), "save");
    assert!(dashboard.session().stamps().is_empty());
}

#[test]
fn discard_then_save_makes_no_archive_call() {
    let api = FakeApi::with_devices(&["A"]);
    let (mut dashboard, rx) = started(&api, &[]);
    dashboard.handle_key(press(KeyCode::Char('1')));

    dashboard.apply(DashboardAction::Discard);
    dashboard.apply(DashboardAction::Save);

    assert!(dashboard.session().stamps().is_empty());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(api.save_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn device_fetch_failure_keeps_snapshot_and_warns_once() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, rx) = started(&api, &[]);
    api.fail_devices.store(true, Ordering::SeqCst);

    dashboard.request_refresh();
    pump(&mut dashboard, &rx);
    dashboard.request_refresh();
    pump(&mut dashboard, &rx);

    assert_eq!(dashboard.devices().devices().len(), 2);
    let warnings = dashboard
        .events()
        .iter()
        .filter(|entry| entry.severity == Severity::Warning)
        .count();
    assert_eq!(warnings, 1);
}

#[test]
fn target_changes_are_clamped_and_published() {
    let api = FakeApi::with_devices(&["A"]);
    let (mut dashboard, rx) = started(&api, &["--target-count", "8"]);

    dashboard.handle_key(press(KeyCode::Char('+')));
    assert_eq!(pump(&mut dashboard, &rx), "target");
    dashboard.apply(DashboardAction::TargetUp);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert_eq!(dashboard.session().target_count(), 9);
    assert_eq!(*api.targets.lock().expect("lock"), vec![9]);
}

#[test]
fn runner_edit_swallows_capture_keys() {
    let api = FakeApi::with_devices(&["A"]);
    let (mut dashboard, _rx) = started(&api, &["--runner", "old"]);

    dashboard.handle_key(press(KeyCode::Char('r')));
    assert_eq!(dashboard.runner_edit(), Some("old"));
    for _ in 0..3 {
        dashboard.handle_key(press(KeyCode::Backspace));
    }
    for ch in "ann 1".chars() {
        dashboard.handle_key(press(KeyCode::Char(ch)));
    }
    assert!(!dashboard.handle_key(press(KeyCode::Char('q'))));
    dashboard.handle_key(press(KeyCode::Backspace));
    dashboard.handle_key(press(KeyCode::Enter));

    assert_eq!(dashboard.runner(), "ann 1");
    assert!(dashboard.session().stamps().is_empty());
    assert!(dashboard.handle_key(press(KeyCode::Char('q'))));
}

#[test]
fn nothing_is_applied_after_shutdown() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, rx) = dashboard(&api, &[]);
    dashboard.request_refresh();
    let message = rx.recv_timeout(WAIT).expect("devices");

    dashboard.shutdown();
    dashboard.handle_worker_message(message);
    dashboard.handle_stream_event(StreamEvent::Frame(
        json!({"type": "events", "data": [{"msg": "late"}]}).to_string(),
    ));

    assert!(dashboard.devices().devices().is_empty());
    assert!(dashboard.events().is_empty());
    dashboard.request_refresh();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn feed_disconnect_leaves_devices_and_log_alone() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let (mut dashboard, rx) = started(&api, &[]);
    dashboard.handle_stream_event(StreamEvent::Frame(
        json!({"type": "events", "data": [{"msg": "armed"}]}).to_string(),
    ));
    pump(&mut dashboard, &rx);

    dashboard.handle_stream_event(StreamEvent::Disconnected {
        reason: "connection reset".into(),
    });
    dashboard.handle_stream_event(StreamEvent::Connected);

    assert_eq!(dashboard.events().len(), 1);
    assert_eq!(dashboard.devices().devices().len(), 2);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn focus_loss_releases_a_stuck_key() {
    let api = FakeApi::with_devices(&["A", "B"]);
    let mut config = AppConfig::parse_from(["test-app"]);
    config.validate().expect("valid config");
    let (tx, rx) = unbounded();
    let shared: Arc<dyn DashboardApi> = api.clone();
    let mut dashboard = Dashboard::new(config, shared, tx, true);
    dashboard.start();
    pump(&mut dashboard, &rx);
    pump(&mut dashboard, &rx);

    // The release for this press went to another window.
    dashboard.handle_key(press(KeyCode::Char(' ')));
    dashboard.handle_key(press(KeyCode::Char(' ')));
    assert_eq!(stamped_ids(&dashboard), vec!["A"]);

    dashboard.forget_held_keys();
    dashboard.handle_key(press(KeyCode::Char(' ')));
    assert_eq!(stamped_ids(&dashboard), vec!["A", "B"]);
}

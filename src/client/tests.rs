use super::http::{parse_mode_ack, parse_runs, parse_save_response};
use super::stream::reconnect_delay;
use super::*;
use crate::model::StampPayload;
use crossbeam_channel::unbounded;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

fn save_request() -> SaveRunRequest {
    SaveRunRequest {
        runner: "eric".into(),
        mode: Mode::Decentralized,
        stamps: vec![StampPayload {
            device_id: "CONE_A".into(),
            device_label: "1. CONE_A".into(),
            ts_iso: "2024-05-01T12:00:00.000Z".into(),
        }],
    }
}

fn stream_settings(url: String) -> StreamSettings {
    StreamSettings {
        url,
        heartbeat: Duration::from_millis(50),
        reconnect_base: Duration::from_millis(20),
        reconnect_max: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_millis(20),
    }
}

/// Serve exactly one HTTP/1.1 response to the first GET and return the base URL.
fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut line = String::new();
        while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
            if line == "\r\n" {
                break;
            }
            line.clear();
        }
        let mut stream = stream;
        let response = format!(
            "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });
    format!("http://{addr}")
}

#[test]
fn mode_ack_rejection_is_an_error() {
    assert!(parse_mode_ack(json!({"ok": true, "mode": "decentralized"})).is_ok());
    let err = parse_mode_ack(json!({"ok": false, "error": "mode must be centralized|decentralized"}))
        .expect_err("rejected");
    assert!(format!("{err:#}").contains("mode must be"));
}

#[test]
fn save_response_prefers_embedded_run() {
    let body = json!({"ok": true, "id": 12, "run": {"id": 12, "runner": "eric", "mode": "decentralized"}});
    let run = parse_save_response(body, &save_request()).expect("run");
    assert_eq!(run.id, 12);
    assert_eq!(run.runner, "eric");
}

#[test]
fn save_response_synthesizes_missing_run() {
    let body = json!({"ok": true, "id": 9, "run": null});
    let run = parse_save_response(body, &save_request()).expect("run");
    assert_eq!(run.id, 9);
    assert_eq!(run.mode, "decentralized");
    assert_eq!(run.stamps.len(), 1);
}

#[test]
fn save_response_accepts_bare_summary_and_rejects_failures() {
    let run = parse_save_response(json!({"id": 3, "runner": "ann"}), &save_request()).expect("run");
    assert_eq!(run.runner, "ann");
    assert!(parse_save_response(json!({"ok": false, "error": "No stamps provided"}), &save_request()).is_err());
    assert!(parse_save_response(json!({"ok": true}), &save_request()).is_err());
}

#[test]
fn run_list_must_be_a_collection() {
    assert_eq!(parse_runs(json!([{"id": 1}, {"id": 2}])).expect("runs").len(), 2);
    assert!(parse_runs(json!("nope")).is_err());
}

#[test]
fn reconnect_delay_doubles_and_caps() {
    let settings = stream_settings("ws://127.0.0.1:1/ws/events".into());
    assert_eq!(reconnect_delay(&settings, 0), Duration::from_millis(20));
    assert_eq!(reconnect_delay(&settings, 1), Duration::from_millis(20));
    assert_eq!(reconnect_delay(&settings, 2), Duration::from_millis(40));
    assert_eq!(reconnect_delay(&settings, 10), Duration::from_millis(200));
}

#[test]
fn http_api_fetches_device_map() {
    let base = serve_once(
        "HTTP/1.1 200 OK",
        r#"{"CONE_A":{"id":"CONE_A","ip":"10.0.0.5","last_seen":1700000000000}}"#,
    );
    let api = HttpApi::new(&base, Duration::from_secs(2)).expect("client");
    let devices = api.fetch_devices().expect("devices");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].ip.as_deref(), Some("10.0.0.5"));
}

#[test]
fn http_api_reports_status_failures() {
    let base = serve_once("HTTP/1.1 503 Service Unavailable", "{}");
    let api = HttpApi::new(&base, Duration::from_secs(2)).expect("client");
    let err = api.fetch_runs().expect_err("503");
    assert!(format!("{err:#}").contains("GET /api/runs 503"));
}

#[test]
fn stream_delivers_frames_heartbeats_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (ping_tx, ping_rx) = unbounded();
    thread::spawn(move || {
        for _ in 0..2 {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let Ok(mut socket) = tungstenite::accept(stream) else {
                return;
            };
            let frame = json!({"type": "events", "data": [{"msg": "hello"}]}).to_string();
            let _ = socket.send(tungstenite::Message::text(frame));
            if let Ok(tungstenite::Message::Text(text)) = socket.read() {
                let _ = ping_tx.send(text.as_str().to_owned());
            }
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    });

    let (tx, rx) = unbounded();
    let mut handle =
        connect_event_stream(stream_settings(format!("ws://{addr}/ws/events")), tx).expect("spawn");
    let timeout = Duration::from_secs(5);
    assert_eq!(rx.recv_timeout(timeout).expect("connected"), StreamEvent::Connected);
    match rx.recv_timeout(timeout).expect("frame") {
        StreamEvent::Frame(frame) => assert!(frame.contains("hello")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(ping_rx.recv_timeout(timeout).expect("heartbeat"), "ping");

    let mut reconnected = false;
    while let Ok(event) = rx.recv_timeout(timeout) {
        if event == StreamEvent::Connected {
            reconnected = true;
            break;
        }
    }
    assert!(reconnected);

    handle.close();
    assert!(!handle.is_open());
    while rx.try_recv().is_ok() {}
    thread::sleep(Duration::from_millis(100));
    assert!(rx.try_recv().is_err());
}

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::Sender;
use tungstenite::http::Uri;
use tungstenite::{Error as WsError, Message, WebSocket};

use crate::worker::Lifetime;
use crate::{log_debug, log_debug_content};

/// How long `close` waits for the worker before detaching it.
const CLOSE_GRACE: Duration = Duration::from_millis(500);
const CLOSE_POLL: Duration = Duration::from_millis(10);
/// Slice used for backoff sleeps so teardown is noticed promptly.
const BACKOFF_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub heartbeat: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub connect_timeout: Duration,
    /// Socket read timeout; bounds how late heartbeats and teardown are noticed.
    pub read_timeout: Duration,
}

/// What the feed worker reports to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Connected,
    Frame(String),
    Disconnected { reason: String },
}

/// Owner of the feed worker. Closing (or dropping) it stops delivery immediately.
pub struct StreamHandle {
    lifetime: Lifetime,
    handle: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn close(&mut self) {
        self.lifetime.end();
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + CLOSE_GRACE;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(CLOSE_POLL);
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            log_debug("event stream worker still blocked; detaching");
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some() && self.lifetime.is_alive()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Start the persistent feed connection. Reconnects with backoff until closed.
pub fn connect_event_stream(
    settings: StreamSettings,
    tx: Sender<StreamEvent>,
) -> std::io::Result<StreamHandle> {
    let lifetime = Lifetime::new();
    let worker_lifetime = lifetime.clone();
    let handle = thread::Builder::new()
        .name("conewatch-stream".into())
        .spawn(move || run_stream(&settings, &tx, &worker_lifetime))?;
    Ok(StreamHandle {
        lifetime,
        handle: Some(handle),
    })
}

fn run_stream(settings: &StreamSettings, tx: &Sender<StreamEvent>, lifetime: &Lifetime) {
    let mut failures: u32 = 0;
    while lifetime.is_alive() {
        match open_socket(settings) {
            Ok(mut socket) => {
                failures = 0;
                log_debug(&format!("event stream connected: {}", settings.url));
                if !deliver(tx, lifetime, StreamEvent::Connected) {
                    let _ = socket.close(None);
                    return;
                }
                let reason = pump(&mut socket, settings, tx, lifetime);
                let _ = socket.close(None);
                let _ = socket.flush();
                if !lifetime.is_alive() {
                    return;
                }
                log_debug(&format!("event stream lost: {reason}"));
                if !deliver(tx, lifetime, StreamEvent::Disconnected { reason }) {
                    return;
                }
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                log_debug(&format!("event stream connect failed ({failures}): {err:#}"));
            }
        }
        sleep_while_alive(reconnect_delay(settings, failures), lifetime);
    }
}

/// Base delay doubled per consecutive failure, capped.
pub(super) fn reconnect_delay(settings: &StreamSettings, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    settings
        .reconnect_base
        .saturating_mul(1u32 << shift)
        .min(settings.reconnect_max)
}

fn sleep_while_alive(total: Duration, lifetime: &Lifetime) {
    let deadline = Instant::now() + total;
    while lifetime.is_alive() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(BACKOFF_SLICE.min(deadline - now));
    }
}

fn deliver(tx: &Sender<StreamEvent>, lifetime: &Lifetime, event: StreamEvent) -> bool {
    lifetime.is_alive() && tx.send(event).is_ok()
}

fn open_socket(settings: &StreamSettings) -> Result<WebSocket<TcpStream>> {
    let uri: Uri = settings
        .url
        .parse()
        .with_context(|| format!("invalid stream URL {}", settings.url))?;
    if uri.scheme_str() != Some("ws") {
        bail!("only ws:// stream URLs are supported");
    }
    let host = uri
        .host()
        .ok_or_else(|| anyhow!("stream URL has no host"))?;
    let port = uri.port_u16().unwrap_or(80);
    let addr = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {host}:{port}"))?
        .next()
        .ok_or_else(|| anyhow!("{host}:{port} resolved to no addresses"))?;
    let stream = TcpStream::connect_timeout(&addr, settings.connect_timeout)
        .with_context(|| format!("failed to connect to {addr}"))?;
    stream
        .set_read_timeout(Some(settings.read_timeout))
        .context("failed to set stream read timeout")?;
    let (socket, _response) = tungstenite::client(settings.url.as_str(), stream)
        .map_err(|err| anyhow!("websocket handshake failed: {err}"))?;
    Ok(socket)
}

/// Read frames until the connection drops or the owner goes away. Returns the reason.
fn pump(
    socket: &mut WebSocket<TcpStream>,
    settings: &StreamSettings,
    tx: &Sender<StreamEvent>,
    lifetime: &Lifetime,
) -> String {
    let mut last_heartbeat = Instant::now();
    loop {
        if !lifetime.is_alive() {
            return "closed".to_string();
        }
        if last_heartbeat.elapsed() >= settings.heartbeat {
            if let Err(err) = socket.send(Message::text("ping")) {
                return format!("heartbeat failed: {err}");
            }
            last_heartbeat = Instant::now();
        }
        let frame = match socket.read() {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => return "closed by server".to_string(),
            Ok(_) => continue,
            Err(WsError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(err) => return err.to_string(),
        };
        log_debug_content(&format!("event frame: {frame}"));
        if !deliver(tx, lifetime, StreamEvent::Frame(frame)) {
            return "closed".to_string();
        }
    }
}

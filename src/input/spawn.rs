use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use crossterm::event::{self, Event};

use crate::input::event::InputEvent;
use crate::log_debug;
use crate::worker::Lifetime;

/// How long a single poll may block before the thread re-checks its lifetime.
const INPUT_POLL_MS: u64 = 100;

pub fn spawn_input_thread(
    tx: Sender<InputEvent>,
    lifetime: Lifetime,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("conewatch-input".into())
        .spawn(move || {
            while lifetime.is_alive() {
                match event::poll(Duration::from_millis(INPUT_POLL_MS)) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(err) => {
                        log_debug(&format!("input poll error: {err}"));
                        break;
                    }
                }
                let forwarded = match event::read() {
                    Ok(Event::Key(key)) => InputEvent::Key(key),
                    Ok(Event::Resize(cols, rows)) => InputEvent::Resize { cols, rows },
                    Ok(Event::FocusLost) => InputEvent::FocusLost,
                    Ok(_) => continue,
                    Err(err) => {
                        log_debug(&format!("input read error: {err}"));
                        break;
                    }
                };
                if !lifetime.is_alive() || tx.send(forwarded).is_err() {
                    return;
                }
            }
        })
}

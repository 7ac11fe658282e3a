//! Full-screen `ratatui` front-end: terminal setup, the single event loop, and rendering.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{never, select, tick, unbounded, Receiver};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};

use crate::app::Dashboard;
use crate::client::{connect_event_stream, DashboardApi, StreamEvent};
use crate::config::AppConfig;
use crate::input::{spawn_input_thread, InputEvent};
use crate::log_debug;
use crate::model::{Device, Severity};
use crate::terminal_restore::TerminalRestoreGuard;
use crate::text::{sanitize_display, truncate_columns};
use crate::worker::WorkerMessage;

const BORDER: Color = Color::Rgb(255, 90, 90);
const TITLE: Color = Color::Rgb(255, 110, 110);
const DIM: Color = Color::Rgb(130, 70, 70);
const TEXT: Color = Color::Rgb(210, 205, 200);
const ACCENT: Color = Color::Rgb(255, 220, 100);
const GOOD: Color = Color::Rgb(110, 220, 130);
const BAD: Color = Color::Rgb(255, 90, 90);

/// Configure the terminal, run the event loop, and tear everything down on every exit path.
pub fn run_app(config: AppConfig, api: Arc<dyn DashboardApi>) -> Result<()> {
    let terminal_guard = TerminalRestoreGuard::new();
    terminal_guard.enable_raw_mode()?;
    let mut stdout = io::stdout();
    terminal_guard.enter_alt_screen(&mut stdout)?;
    let reports_release = terminal_guard
        .enable_key_event_kinds(&mut stdout)
        .unwrap_or(false);
    log_debug(&format!("key event kinds reported: {reports_release}"));
    if let Err(err) = terminal_guard.enable_focus_events(&mut stdout) {
        log_debug(&format!("focus reporting unavailable: {err}"));
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (worker_tx, worker_rx) = unbounded();
    let mut dashboard = Dashboard::new(config, api, worker_tx, reports_release);
    let result = app_loop(&mut terminal, &mut dashboard, worker_rx);

    dashboard.shutdown();
    drop(terminal);
    terminal_guard.restore();

    result
}

fn app_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    worker_rx: Receiver<WorkerMessage>,
) -> Result<()> {
    let (input_tx, input_rx) = unbounded();
    let input_thread = spawn_input_thread(input_tx, dashboard.lifetime().clone())
        .context("failed to start input thread")?;
    let (stream_tx, stream_rx) = unbounded();
    let mut stream = connect_event_stream(dashboard.config().stream_settings()?, stream_tx)
        .context("failed to start event stream")?;
    let mut stream_rx: Receiver<StreamEvent> = stream_rx;
    let ticker = tick(dashboard.config().poll_interval());

    dashboard.start();
    terminal.draw(|frame| draw(frame, dashboard))?;

    loop {
        let mut should_quit = false;
        let mut stream_gone = false;
        select! {
            recv(input_rx) -> event => match event {
                Ok(InputEvent::Key(key)) => should_quit = dashboard.handle_key(key),
                Ok(InputEvent::Resize { .. }) => {
                    dashboard.forget_held_keys();
                    dashboard.request_redraw();
                }
                Ok(InputEvent::FocusLost) => dashboard.forget_held_keys(),
                Err(_) => {
                    log_debug("input thread stopped; exiting");
                    should_quit = true;
                }
            },
            recv(worker_rx) -> message => {
                if let Ok(message) = message {
                    dashboard.handle_worker_message(message);
                }
            },
            recv(stream_rx) -> event => match event {
                Ok(event) => dashboard.handle_stream_event(event),
                Err(_) => stream_gone = true,
            },
            recv(ticker) -> _ => dashboard.on_tick(),
        }

        if stream_gone {
            log_debug("event stream channel closed");
            stream_rx = never();
        }
        if dashboard.take_redraw_request() {
            terminal.draw(|frame| draw(frame, dashboard))?;
        }
        if should_quit {
            break;
        }
    }

    dashboard.shutdown();
    stream.close();
    if input_thread.join().is_err() {
        log_debug("input thread panicked");
    }
    Ok(())
}

/// Render the whole dashboard from current state.
pub fn draw(frame: &mut Frame<'_>, dashboard: &Dashboard) {
    let now = Utc::now();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(frame.size());
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[2]);

    draw_header(frame, rows[0], dashboard, now);
    draw_devices(frame, middle[0], dashboard, now);
    draw_session(frame, middle[1], dashboard);
    draw_events(frame, lower[0], dashboard);
    draw_runs(frame, lower[1], dashboard);
    draw_footer(frame, rows[3], dashboard);
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(
            title,
            Style::default().fg(TITLE).add_modifier(Modifier::BOLD),
        ))
}

fn draw_header(frame: &mut Frame<'_>, area: Rect, dashboard: &Dashboard, now: DateTime<Utc>) {
    let fleet = dashboard.fleet_status(now.timestamp_millis());
    let banner_color = if fleet.all_online() { GOOD } else { BAD };
    let mode = dashboard.mode();
    let mode_text = match mode.pending() {
        Some(pending) => format!("{} -> {}…", mode.current().as_str(), pending.as_str()),
        None => mode.current().as_str().to_string(),
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", fleet.headline()),
            Style::default()
                .fg(banner_color)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{} / {} online", fleet.online, fleet.total),
            Style::default().fg(TEXT),
        ),
        Span::styled("   mode: ", Style::default().fg(DIM)),
        Span::styled(mode_text, Style::default().fg(ACCENT)),
    ]);
    frame.render_widget(Paragraph::new(line).block(panel(" Conewatch ")), area);
}

fn age_label(device: &Device, now_ms: i64) -> String {
    match device.last_seen_ms {
        Some(last_seen) => {
            let secs = now_ms.saturating_sub(last_seen).max(0) / 1000;
            format!("{secs}s ago")
        }
        None => "never".to_string(),
    }
}

fn draw_devices(frame: &mut Frame<'_>, area: Rect, dashboard: &Dashboard, now: DateTime<Utc>) {
    let now_ms = now.timestamp_millis();
    let window = dashboard.config().online_window_ms;
    let usable = dashboard.session().usable_count(dashboard.devices().devices());
    let rows: Vec<Row> = dashboard
        .devices()
        .devices()
        .iter()
        .enumerate()
        .map(|(index, device)| {
            let online = device.is_online(now_ms, window);
            let (state, color) = if online {
                ("ONLINE", GOOD)
            } else {
                ("OFFLINE", BAD)
            };
            let position = if index < usable {
                format!("{}", index + 1)
            } else {
                "-".to_string()
            };
            let signal = device
                .signal_percent()
                .map(|pct| format!("{pct}%"))
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(position),
                Cell::from(truncate_columns(&sanitize_display(device.display_name()), 18)),
                Cell::from(device.ip.clone().unwrap_or_else(|| "-".to_string())),
                Cell::from(signal),
                Cell::from(age_label(device, now_ms)),
                Cell::from(Span::styled(state, Style::default().fg(color))),
            ])
            .style(Style::default().fg(TEXT))
        })
        .collect();
    let widths = [
        Constraint::Length(2),
        Constraint::Min(10),
        Constraint::Length(15),
        Constraint::Length(6),
        Constraint::Length(9),
        Constraint::Length(7),
    ];
    let header = Row::new(vec!["#", "Device", "IP", "Signal", "Seen", "State"])
        .style(Style::default().fg(DIM).add_modifier(Modifier::BOLD));
    let table = Table::new(rows, widths)
        .header(header)
        .block(panel(" Devices "));
    frame.render_widget(table, area);
}

fn draw_session(frame: &mut Frame<'_>, area: Rect, dashboard: &Dashboard) {
    let session = dashboard.session();
    let devices = dashboard.devices().devices();
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Session ", Style::default().fg(DIM)),
            Span::styled(
                format!("#{}", session.session_id()),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled("  target ", Style::default().fg(DIM)),
            Span::styled(
                format!(
                    "{} ({} usable)",
                    session.target_count(),
                    session.usable_count(devices)
                ),
                Style::default().fg(TEXT),
            ),
        ]),
        runner_line(dashboard),
    ];
    let next = session
        .usable(devices)
        .get(session.next_index())
        .map(|device| format!("{}. {}", session.next_index() + 1, device.id))
        .unwrap_or_else(|| "-".to_string());
    lines.push(Line::from(vec![
        Span::styled("Space next: ", Style::default().fg(DIM)),
        Span::styled(next, Style::default().fg(TEXT)),
    ]));
    if session.is_saving() {
        lines.push(Line::from(Span::styled(
            "Saving…",
            Style::default().fg(ACCENT),
        )));
    }
    if session.stamps().is_empty() {
        lines.push(Line::from(Span::styled(
            "No stamps yet. Press 1-9 or Space.",
            Style::default().fg(DIM),
        )));
    }
    for (i, stamp) in session.stamps().iter().enumerate() {
        let split = session
            .split_ms(i)
            .map(|ms| format!("+{:.3}s", ms as f64 / 1000.0))
            .unwrap_or_default();
        lines.push(Line::from(vec![
            Span::styled(
                format!("{:>2} ", i + 1),
                Style::default().fg(DIM),
            ),
            Span::styled(
                truncate_columns(&sanitize_display(&stamp.device_label), 20),
                Style::default().fg(TEXT),
            ),
            Span::styled(
                format!("  {}  ", stamp.at.format("%H:%M:%S%.3f")),
                Style::default().fg(TEXT),
            ),
            Span::styled(split, Style::default().fg(ACCENT)),
        ]));
    }
    frame.render_widget(
        Paragraph::new(Text::from(lines)).block(panel(" Capture ")),
        area,
    );
}

fn runner_line(dashboard: &Dashboard) -> Line<'static> {
    match dashboard.runner_edit() {
        Some(buffer) => Line::from(vec![
            Span::styled("Runner: ", Style::default().fg(DIM)),
            Span::styled(
                format!("{}_", sanitize_display(buffer)),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
        ]),
        None => {
            let runner = sanitize_display(dashboard.runner());
            let shown = if runner.is_empty() {
                "(unnamed)".to_string()
            } else {
                runner
            };
            Line::from(vec![
                Span::styled("Runner: ", Style::default().fg(DIM)),
                Span::styled(shown, Style::default().fg(TEXT)),
            ])
        }
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Success => GOOD,
        Severity::Info => TEXT,
        Severity::Warning => ACCENT,
        Severity::Error => BAD,
    }
}

fn draw_events(frame: &mut Frame<'_>, area: Rect, dashboard: &Dashboard) {
    let visible = usize::from(area.height.saturating_sub(2));
    let width = usize::from(area.width.saturating_sub(2));
    let lines: Vec<Line> = dashboard
        .events()
        .iter()
        .take(visible)
        .map(|entry| {
            let device = entry
                .device_ref
                .as_deref()
                .map(|device| format!("{}: ", sanitize_display(device)))
                .unwrap_or_default();
            let text = format!(
                "{} [{}] {device}{}",
                short_time(&entry.timestamp),
                entry.severity.label(),
                sanitize_display(&entry.message)
            );
            Line::from(Span::styled(
                truncate_columns(&text, width),
                Style::default().fg(severity_color(entry.severity)),
            ))
        })
        .collect();
    let title = format!(
        " Events ({}/{}) ",
        dashboard.events().len(),
        dashboard.events().capacity()
    );
    frame.render_widget(Paragraph::new(Text::from(lines)).block(panel(&title)), area);
}

/// `HH:MM:SS` from an RFC 3339 stamp; other formats are shown as-is.
fn short_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc).format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| sanitize_display(timestamp))
}

fn draw_runs(frame: &mut Frame<'_>, area: Rect, dashboard: &Dashboard) {
    let archive = dashboard.archive();
    let width = usize::from(area.width.saturating_sub(2));
    let lines: Vec<Line> = if !archive.is_loaded() && archive.runs().is_empty() {
        vec![Line::from(Span::styled(
            "Loading saved runs…",
            Style::default().fg(DIM),
        ))]
    } else {
        archive
            .runs()
            .iter()
            .take(usize::from(area.height.saturating_sub(2)))
            .map(|run| {
                let marks: Vec<String> = run
                    .marks()
                    .into_iter()
                    .map(|(label, _)| label)
                    .collect();
                let text = format!(
                    "#{} {} {} [{}] {}",
                    run.id,
                    short_time(&run.created_at),
                    sanitize_display(&run.runner),
                    run.mode,
                    marks.join(", ")
                );
                Line::from(Span::styled(
                    truncate_columns(&text, width),
                    Style::default().fg(TEXT),
                ))
            })
            .collect()
    };
    frame.render_widget(
        Paragraph::new(Text::from(lines)).block(panel(" Saved runs ")),
        area,
    );
}

fn draw_footer(frame: &mut Frame<'_>, area: Rect, dashboard: &Dashboard) {
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(
                key,
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::styled(label, Style::default().fg(DIM)),
        ]
    };
    let mut spans = Vec::new();
    for (key, label) in [
        (" 1-9", " stamp  "),
        ("Space", " next  "),
        ("m", " mode  "),
        ("+/-", " target  "),
        ("n", " new  "),
        ("d", " discard  "),
        ("s", " save  "),
        ("r", " runner  "),
        ("q", " quit "),
    ] {
        spans.extend(hint(key, label));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(DIM))
        .title_bottom(Line::from(spans));
    let status = Paragraph::new(sanitize_display(dashboard.status()))
        .style(Style::default().fg(TEXT))
        .block(block);
    frame.render_widget(status, area);
}

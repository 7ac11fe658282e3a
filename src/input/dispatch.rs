use std::collections::HashSet;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Operator intent decoded from one physical key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardAction {
    /// Digit `1`-`9`: stamp the device at this 0-based position.
    Record(usize),
    /// Space: stamp the device under the rotating cursor.
    RecordSequential,
    ToggleMode,
    TargetUp,
    TargetDown,
    NewSession,
    Discard,
    Save,
    EditRunner,
    Quit,
}

/// Maps key events to actions, yielding at most one action per physical press.
///
/// Terminals that report key kinds send `Repeat` while a key is held; those are dropped.
/// When releases are reported as well, a second `Press` without an intervening release
/// is also treated as auto-repeat. Nothing is buffered: every fresh press is dispatched
/// against whatever state the dashboard holds at that instant.
#[derive(Debug, Default)]
pub struct InputDispatcher {
    reports_release: bool,
    held: HashSet<KeyCode>,
}

impl InputDispatcher {
    pub fn new(reports_release: bool) -> Self {
        Self {
            reports_release,
            held: HashSet::new(),
        }
    }

    /// Track press/release state; returns true only for a fresh physical press.
    pub fn observe(&mut self, key: &KeyEvent) -> bool {
        match key.kind {
            KeyEventKind::Release => {
                self.held.remove(&held_key(key.code));
                false
            }
            KeyEventKind::Repeat => false,
            KeyEventKind::Press => !self.reports_release || self.held.insert(held_key(key.code)),
        }
    }

    /// Drop all press tracking, e.g. after focus loss when releases went elsewhere.
    pub fn reset(&mut self) {
        self.held.clear();
    }

    pub fn dispatch(&mut self, key: &KeyEvent) -> Option<DashboardAction> {
        if !self.observe(key) {
            return None;
        }
        map_key(key)
    }
}

/// Physical key identity: shift state can differ between press and release
/// (`+` pressed, `=` released), so both sides are folded to the unshifted char.
fn held_key(code: KeyCode) -> KeyCode {
    match code {
        KeyCode::Char('+') => KeyCode::Char('='),
        KeyCode::Char('_') => KeyCode::Char('-'),
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    }
}

fn map_key(key: &KeyEvent) -> Option<DashboardAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(DashboardAction::Quit),
            _ => None,
        };
    }
    let action = match key.code {
        KeyCode::Char(c @ '1'..='9') => {
            let digit = c.to_digit(10)? as usize;
            DashboardAction::Record(digit - 1)
        }
        KeyCode::Char(' ') => DashboardAction::RecordSequential,
        KeyCode::Char('m') => DashboardAction::ToggleMode,
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => DashboardAction::TargetUp,
        KeyCode::Char('-') | KeyCode::Down => DashboardAction::TargetDown,
        KeyCode::Char('n') => DashboardAction::NewSession,
        KeyCode::Char('d') => DashboardAction::Discard,
        KeyCode::Char('s') => DashboardAction::Save,
        KeyCode::Char('r') => DashboardAction::EditRunner,
        KeyCode::Char('q') => DashboardAction::Quit,
        _ => return None,
    };
    Some(action)
}

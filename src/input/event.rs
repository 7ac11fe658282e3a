use crossterm::event::KeyEvent;

/// Terminal events forwarded from the input thread to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Resize { cols: u16, rows: u16 },
    /// The terminal lost focus; key releases may not arrive until it returns.
    FocusLost,
}

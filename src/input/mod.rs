//! Keyboard plumbing: a reader thread feeding the event loop, and the dispatcher that
//! maps key presses onto dashboard actions.

mod dispatch;
mod event;
mod spawn;

pub use dispatch::{DashboardAction, InputDispatcher};
pub use event::InputEvent;
pub use spawn::spawn_input_thread;

//! Collaborators the dashboard talks to: the device/run service over HTTP and the
//! event feed over WebSocket. The dashboard only sees the `DashboardApi` trait so
//! tests can swap in a scripted service.

mod http;
mod stream;
#[cfg(test)]
mod tests;

use anyhow::Result;

use crate::model::{Device, Mode, ModeAck, RunSummary, SaveRunRequest};

pub use http::HttpApi;
pub use stream::{connect_event_stream, StreamEvent, StreamHandle, StreamSettings};

pub trait DashboardApi: Send + Sync {
    fn fetch_devices(&self) -> Result<Vec<Device>>;
    fn switch_mode(&self, mode: Mode) -> Result<ModeAck>;
    fn save_run(&self, request: &SaveRunRequest) -> Result<RunSummary>;
    fn fetch_runs(&self) -> Result<Vec<RunSummary>>;
    fn set_target(&self, count: u8) -> Result<()>;
}

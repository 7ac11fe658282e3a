pub mod app;
pub mod archive;
pub mod capture;
pub mod client;
pub mod config;
pub mod devices;
pub mod doctor;
pub mod events;
pub mod input;
pub mod mode;
pub mod model;
mod telemetry;
pub mod terminal_restore;
pub mod text;
pub mod ui;
pub mod worker;

pub use app::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_job_timing,
    log_panic, Dashboard,
};
pub use ui::run_app;

//! Dashboard context and the file loggers it reports through.

mod logging;
mod state;
#[cfg(test)]
mod tests;

pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_job_timing,
    log_panic,
};
pub use state::{Dashboard, RUNNER_MAX_CHARS};

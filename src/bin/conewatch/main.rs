//! Conewatch entrypoint: watch a cone fleet, time runs from the keyboard, and review
//! saved runs.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use conewatch::client::{DashboardApi, HttpApi};
use conewatch::config::AppConfig;
use conewatch::doctor::doctor_report;
use conewatch::model::RunSummary;
use conewatch::text::sanitize_display;
use conewatch::{init_logging, log_debug, log_file_path, run_app};

fn main() -> Result<()> {
    let mut config = AppConfig::parse();
    if config.doctor {
        println!("{}", doctor_report(&config, "conewatch", true).render());
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    log_debug("=== Conewatch Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));
    log_debug(&format!("API base: {}", config.api_base));

    let api: Arc<dyn DashboardApi> =
        Arc::new(HttpApi::new(&config.api_base, config.http_timeout())?);

    if config.list_runs {
        let runs = api.fetch_runs()?;
        print!("{}", format_runs(&runs));
        return Ok(());
    }

    let result = run_app(config, api);
    log_debug("=== Conewatch Exited ===");
    result
}

fn format_runs(runs: &[RunSummary]) -> String {
    if runs.is_empty() {
        return "No saved runs.\n".to_string();
    }
    let mut out = String::new();
    for run in runs {
        out.push_str(&format!(
            "#{:<5} {:<25} {:<16} {:<14}\n",
            run.id,
            sanitize_display(&run.created_at),
            sanitize_display(&run.runner),
            sanitize_display(&run.mode)
        ));
        for (label, ts) in run.marks() {
            out.push_str(&format!(
                "        {:<20} {}\n",
                sanitize_display(&label),
                sanitize_display(&ts)
            ));
        }
    }
    out
}

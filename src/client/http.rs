use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use reqwest::blocking::{Client, Response};
use serde_json::{json, Value};

use super::DashboardApi;
use crate::model::{
    format_timestamp, parse_devices, Device, Mode, ModeAck, RunSummary, SaveRunRequest,
};

/// Blocking HTTP client for the device/run service. Calls are made from worker threads.
pub struct HttpApi {
    client: Client,
    base: String,
}

impl HttpApi {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .header("Cache-Control", "no-store")
            .send()
            .with_context(|| format!("GET {path} failed"))?;
        read_json("GET", path, response)
    }

    fn post_json(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .with_context(|| format!("POST {path} failed"))?;
        read_json("POST", path, response)
    }
}

fn read_json(method: &str, path: &str, response: Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        bail!("{method} {path} {}", status.as_u16());
    }
    response
        .json::<Value>()
        .with_context(|| format!("{method} {path} returned invalid JSON"))
}

impl DashboardApi for HttpApi {
    fn fetch_devices(&self) -> Result<Vec<Device>> {
        parse_devices(self.get_json("/api/devices")?)
    }

    fn switch_mode(&self, mode: Mode) -> Result<ModeAck> {
        let path = format!("/api/mode/{}", mode.as_str());
        parse_mode_ack(self.post_json(&path, None)?)
    }

    fn save_run(&self, request: &SaveRunRequest) -> Result<RunSummary> {
        let body = serde_json::to_value(request).context("failed to encode run")?;
        parse_save_response(self.post_json("/api/runs", Some(&body))?, request)
    }

    fn fetch_runs(&self) -> Result<Vec<RunSummary>> {
        parse_runs(self.get_json("/api/runs")?)
    }

    fn set_target(&self, count: u8) -> Result<()> {
        self.post_json("/api/target", Some(&json!({ "count": count })))?;
        Ok(())
    }
}

pub(super) fn parse_mode_ack(body: Value) -> Result<ModeAck> {
    let ack: ModeAck = serde_json::from_value(body).context("invalid mode acknowledgement")?;
    if !ack.ok {
        return Err(anyhow!(
            "mode switch rejected: {}",
            ack.error.as_deref().unwrap_or("no reason given")
        ));
    }
    Ok(ack)
}

/// The service answers either `{ok, id, run}` or a bare run summary.
pub(super) fn parse_save_response(body: Value, request: &SaveRunRequest) -> Result<RunSummary> {
    if body.get("ok").and_then(Value::as_bool) == Some(false) {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("no reason given");
        bail!("save rejected: {reason}");
    }
    match body.get("run") {
        Some(run) if !run.is_null() => {
            return serde_json::from_value(run.clone()).context("invalid saved run");
        }
        Some(_) => {}
        None if body.get("ok").is_none() => {
            return serde_json::from_value(body).context("invalid saved run");
        }
        None => {}
    }
    let id = body
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("save response carried neither a run nor an id"))?;
    Ok(RunSummary {
        id,
        created_at: format_timestamp(Utc::now()),
        runner: request.runner.clone(),
        mode: request.mode.as_str().to_string(),
        cone1_id: None,
        cone1_ts: None,
        cone2_id: None,
        cone2_ts: None,
        stamps: request.stamps.clone(),
    })
}

pub(super) fn parse_runs(body: Value) -> Result<Vec<RunSummary>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, item)| item).collect(),
        Value::Null => Vec::new(),
        other => bail!("run list must be an array, got {other}"),
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).context("invalid run entry"))
        .collect()
}

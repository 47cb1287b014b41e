//! Report persistence side effect.
//!
//! When a caller's input carries an `output_path` field, the report of a
//! complete or partial run is mirrored there as pretty JSON. The transport
//! layer owns this: a write failure is logged and swallowed, and the outcome
//! the caller sees never changes because of it.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use crate::engine::ExecutionOutcome;
use crate::events::{EventBus, HarvestEvent};

/// Input field naming where to mirror the report.
pub const OUTPUT_PATH_FIELD: &str = "output_path";

/// Mirror the outcome's report to the path named in `raw_input`, when both
/// exist. Failed outcomes carry no report and write nothing.
pub fn mirror_report(agent: &str, raw_input: &Value, outcome: &ExecutionOutcome, events: &EventBus) {
    let Some(path) = raw_input.get(OUTPUT_PATH_FIELD).and_then(Value::as_str) else {
        return;
    };
    let Some(report) = outcome.report() else {
        return;
    };
    match write_pretty(Path::new(path), &report.as_value()) {
        Ok(()) => {
            tracing::info!("report for {agent} written to {path}");
            events.emit(HarvestEvent::ReportPersisted {
                agent: agent.to_string(),
                path: path.to_string(),
            });
        }
        Err(err) => {
            tracing::warn!("could not write report for {agent} to {path}: {err:#}");
        }
    }
}

fn write_pretty(path: &Path, report: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

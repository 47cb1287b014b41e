//! One-shot agent execution from the command line.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::warn;

use crate::cli::output;
use crate::cli::serve::build_runtime;
use crate::engine::ExecutionOutcome;
use crate::persist;

/// Exit codes: 0 complete, 1 failed, 2 partial — scripts can branch the same
/// way HTTP callers branch on 200/206.
pub async fn run(
    agent: &str,
    input: Option<&str>,
    timeout_secs: u64,
    output_path: Option<&str>,
    http_only: bool,
) -> Result<()> {
    let mut raw_input: Value = match input {
        Some(text) => serde_json::from_str(text).context("parsing --input as JSON")?,
        None => json!({}),
    };
    if !raw_input.is_object() {
        bail!("--input must be a JSON object");
    }
    if let Some(path) = output_path {
        raw_input[persist::OUTPUT_PATH_FIELD] = json!(path);
    }

    let parts = build_runtime(http_only).await?;
    let outcome = parts
        .engine
        .execute(agent, raw_input.clone(), Duration::from_secs(timeout_secs.max(1)))
        .await;
    persist::mirror_report(agent, &raw_input, &outcome, &parts.events);

    if let Err(err) = parts.browser.shutdown().await {
        warn!("browser shutdown: {err:#}");
    }
    // Let the audit subscriber drain before the process exits.
    tokio::task::yield_now().await;

    match outcome {
        ExecutionOutcome::Complete { report } => {
            output::print_json(&report.into_value());
            Ok(())
        }
        ExecutionOutcome::Partial {
            report,
            warning,
            message,
        } => {
            output::print_json(&json!({
                "success": false,
                "report": report.into_value(),
                "warning": warning,
                "message": message,
            }));
            if !output::is_quiet() {
                eprintln!("Warning: {message}");
            }
            std::process::exit(2);
        }
        ExecutionOutcome::Failed { kind, detail } => {
            if output::is_json() {
                output::print_json(&json!({ "error": kind.code(), "detail": detail }));
            } else {
                eprintln!("Error: {detail}");
            }
            std::process::exit(1);
        }
    }
}

//! List the registered agents.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use crate::acquisition::HttpClient;
use crate::agents::{self, AgentDeps};
use crate::browser::NoopBrowser;
use crate::cli::output;
use crate::llm::NoopLlm;
use crate::registry::Registry;

/// `harvest agents`: print every built-in agent's metadata. Registration
/// needs no live backends, so this never launches a browser.
pub async fn run(schemas: bool) -> Result<()> {
    let deps = AgentDeps::new(
        HttpClient::new(30_000),
        Arc::new(NoopBrowser),
        Arc::new(NoopLlm),
    );
    let mut registry = Registry::new();
    agents::register_builtin(&mut registry, &deps)?;

    if output::is_json() || schemas {
        let agents: Vec<Value> = registry
            .list()
            .map(|meta| serde_json::to_value(meta).unwrap_or(Value::Null))
            .collect();
        output::print_json(&json!({ "count": agents.len(), "agents": agents }));
        return Ok(());
    }

    let width = registry.list().map(|m| m.name.len()).max().unwrap_or(0);
    for meta in registry.list() {
        println!(
            "{:width$}  [{}]  {}",
            meta.name,
            meta.strategy,
            meta.description,
        );
    }
    Ok(())
}

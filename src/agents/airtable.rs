//! Airtable shared-view agent.
//!
//! Shared Airtable views are a thin client over a private data API. The
//! runner watches the background requests the rendered page makes, picks
//! the data endpoint out of them, and fetches it directly instead of
//! parsing the grid markup.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agents::{output_path_field, AgentDeps};
use crate::engine::RunContext;
use crate::navigation::capture_api_requests;
use crate::registry::{AgentDescriptor, AgentRunner};
use crate::report::Report;
use crate::schema::{FieldSpec, Schema, ValidatedInput};
use crate::strategy::{InterceptRule, StrategyPolicy};

fn intercept_rule() -> InterceptRule {
    InterceptRule {
        url_markers: vec!["readSharedViewData".to_string(), "/v0.3/".to_string()],
        settle_ms: 2_500,
    }
}

pub fn descriptor(deps: AgentDeps) -> AgentDescriptor {
    AgentDescriptor {
        name: "airtable_hidden_api".to_string(),
        description: "Extract records from an Airtable shared view via its data API".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url")
                .required()
                .describe("Public Airtable shared-view URL"),
            FieldSpec::integer("max_records")
                .default_value(1_000)
                .bounds(1, 100_000)
                .describe("Maximum number of records to capture"),
            output_path_field(),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "records",
                Schema::of(vec![
                    FieldSpec::free_map("fields").required(),
                    FieldSpec::text("record_id"),
                ]),
            )
            .required(),
            FieldSpec::url("api_endpoint"),
        ]),
        strategy: StrategyPolicy::NetworkInterception(intercept_rule()),
        runner: Arc::new(AirtableRunner { deps }),
    }
}

struct AirtableRunner {
    deps: AgentDeps,
}

#[async_trait]
impl AgentRunner for AirtableRunner {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report> {
        let url = input.require_str("url")?;
        let cap = input.require_i64("max_records")? as usize;
        let rule = intercept_rule();

        let mut session = self
            .deps
            .browser
            .open_page()
            .await
            .context("shared-view interception needs a rendered page")?;
        let captured = capture_api_requests(session.as_mut(), url, &rule, ctx).await;
        let _ = session.close().await;
        let captured = captured?;

        let endpoint = captured
            .iter()
            .find(|r| r.url.contains("readSharedViewData"))
            .or_else(|| captured.first())
            .map(|r| r.url.clone());

        let mut records = Vec::new();
        match &endpoint {
            Some(endpoint) => {
                tracing::info!("shared view {url} resolved to data endpoint {endpoint}");
                let step_ms = ctx.step_timeout().as_millis() as u64;
                match self.deps.http.get_json(endpoint, step_ms).await {
                    Ok(payload) => records = records_from_payload(&payload, cap),
                    Err(err) => {
                        tracing::warn!("data endpoint fetch failed, reporting endpoint only: {err:#}");
                    }
                }
            }
            None => {
                tracing::warn!("no data API observed behind {url}");
            }
        }

        let mut out = Map::new();
        out.insert("source_url".to_string(), Value::String(url.to_string()));
        out.insert("records".to_string(), Value::Array(records));
        if let Some(endpoint) = endpoint {
            out.insert("api_endpoint".to_string(), Value::String(endpoint));
        }
        Ok(Report::new(out))
    }
}

/// Normalize the data API payload into `{record_id, fields}` entries. The
/// shared-view endpoint nests rows under `data.table.rows`; the public REST
/// shape uses a top-level `records` list; anything else falls back to the
/// first array of objects in the payload.
fn records_from_payload(payload: &Value, cap: usize) -> Vec<Value> {
    let rows = payload
        .pointer("/data/table/rows")
        .or_else(|| payload.get("records"))
        .and_then(Value::as_array)
        .cloned()
        .or_else(|| first_object_array(payload));

    let Some(rows) = rows else {
        return Vec::new();
    };

    rows.iter()
        .take(cap)
        .filter_map(|row| {
            let obj = row.as_object()?;
            let mut record = Map::new();

            let fields = obj
                .get("cellValuesByColumnId")
                .or_else(|| obj.get("fields"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(|| {
                    let mut rest = obj.clone();
                    rest.remove("id");
                    rest
                });
            record.insert("fields".to_string(), Value::Object(fields));

            if let Some(id) = obj.get("id").and_then(Value::as_str) {
                record.insert("record_id".to_string(), Value::String(id.to_string()));
            }
            Some(Value::Object(record))
        })
        .collect()
}

/// Depth-first search for the first non-empty array of objects.
fn first_object_array(payload: &Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(items) => {
            if !items.is_empty() && items.iter().all(Value::is_object) {
                Some(items.clone())
            } else {
                items.iter().find_map(first_object_array)
            }
        }
        Value::Object(map) => map.values().find_map(first_object_array),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shared_view_rows_become_records() {
        let payload = json!({
            "data": {
                "table": {
                    "rows": [
                        {"id": "recA1", "cellValuesByColumnId": {"fldName": "Acme", "fldCity": "Paris"}},
                        {"id": "recB2", "cellValuesByColumnId": {"fldName": "Globex"}}
                    ]
                }
            }
        });
        let records = records_from_payload(&payload, 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["record_id"], "recA1");
        assert_eq!(records[0]["fields"]["fldName"], "Acme");
        assert_eq!(records[1]["fields"]["fldName"], "Globex");
    }

    #[test]
    fn rest_shape_and_unknown_shapes_still_yield_records() {
        let rest = json!({"records": [{"id": "rec1", "fields": {"Name": "Acme"}}]});
        let records = records_from_payload(&rest, 10);
        assert_eq!(records[0]["fields"]["Name"], "Acme");
        assert_eq!(records[0]["record_id"], "rec1");

        let unknown = json!({"payload": {"items": [{"title": "Row one"}, {"title": "Row two"}]}});
        let records = records_from_payload(&unknown, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["fields"]["title"], "Row one");
    }
}

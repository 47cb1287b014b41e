//! HTTP contract tests.
//!
//! Runs the real router on an ephemeral port and asserts the status-code
//! contract end to end: 200 and 206 carry usable report data, 400/404/500 do
//! not, and the partial envelope always wraps a schema-conformant fallback.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use harvest_runtime::engine::{Engine, RunContext};
use harvest_runtime::events::EventBus;
use harvest_runtime::registry::{AgentDescriptor, AgentRunner, Registry};
use harvest_runtime::report::Report;
use harvest_runtime::rest::{self, AppState};
use harvest_runtime::schema::{FieldSpec, Schema, ValidatedInput};
use harvest_runtime::strategy::StrategyPolicy;
use serde_json::{json, Value};
use tempfile::TempDir;

// ── Stub Runners ──

struct FixedRunner(Value);

#[async_trait]
impl AgentRunner for FixedRunner {
    async fn run(&self, _input: &ValidatedInput, _ctx: &RunContext) -> anyhow::Result<Report> {
        Report::from_value(self.0.clone())
    }
}

struct CrashingRunner;

#[async_trait]
impl AgentRunner for CrashingRunner {
    async fn run(&self, _input: &ValidatedInput, _ctx: &RunContext) -> anyhow::Result<Report> {
        bail!("renderer lost the page")
    }
}

// ── Test Service ──

fn listing_descriptor(name: &str, runner: Arc<dyn AgentRunner>) -> AgentDescriptor {
    AgentDescriptor {
        name: name.to_string(),
        description: "listing stub".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url").required(),
            FieldSpec::integer("max_products").bounds(1, 10).default_value(3),
            FieldSpec::text("output_path"),
        ]),
        output_schema: Schema::of(vec![
            FieldSpec::text("source_url").required(),
            FieldSpec::object_list(
                "startups",
                Schema::of(vec![FieldSpec::text("name").required()]),
            )
            .required(),
        ]),
        strategy: StrategyPolicy::SinglePage,
        runner,
    }
}

fn test_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(listing_descriptor(
            "listing",
            Arc::new(FixedRunner(
                json!({"source_url": "https://x", "startups": [{"name": "Acme"}]}),
            )),
        ))
        .unwrap();
    registry
        .register(listing_descriptor("crashing", Arc::new(CrashingRunner)))
        .unwrap();

    // Required URL output: its fallback cannot be built, so a crash inside
    // this agent is an engine-level internal error.
    let mut undegradable = listing_descriptor("undegradable", Arc::new(CrashingRunner));
    undegradable.output_schema = Schema::of(vec![FieldSpec::url("endpoint").required()]);
    registry.register(undegradable).unwrap();
    registry
}

/// Serve the router on an ephemeral port; returns the base URL.
async fn spawn_service() -> String {
    let registry = Arc::new(test_registry());
    let events = EventBus::new();
    let engine = Engine::new(Arc::clone(&registry), events.clone());
    let state = Arc::new(AppState::new(engine, registry, events));
    let app = rest::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Tests ──

#[tokio::test]
async fn health_reports_agent_count() {
    let base = spawn_service().await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agents_count"], 3);
}

#[tokio::test]
async fn agents_are_listed_with_metadata() {
    let base = spawn_service().await;
    let body: Value = reqwest::get(format!("{base}/agents"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 3);
    let names: Vec<&str> = body["agents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["crashing", "listing", "undegradable"]);

    let one: Value = reqwest::get(format!("{base}/agents/listing"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one["strategy"], "single_page");
    assert!(one["input_schema"].is_object() || one["input_schema"].is_array());
}

#[tokio::test]
async fn unknown_agent_is_404_on_both_routes() {
    let base = spawn_service().await;

    let describe = reqwest::get(format!("{base}/agents/unknown_agent")).await.unwrap();
    assert_eq!(describe.status(), 404);
    let body: Value = describe.json().await.unwrap();
    assert_eq!(body["error"], "E_AGENT_NOT_FOUND");

    let run = reqwest::Client::new()
        .post(format!("{base}/agents/unknown_agent/run"))
        .json(&json!({"url": "https://example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(run.status(), 404);
}

#[tokio::test]
async fn complete_run_returns_the_report_with_200() {
    let base = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/agents/listing/run"))
        .json(&json!({"url": "https://example.com"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().get("x-agent-status").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["startups"][0]["name"], "Acme");
}

#[tokio::test]
async fn interrupted_run_returns_the_partial_envelope_with_206() {
    let base = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/agents/crashing/run"))
        .json(&json!({"url": "https://example.com"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(
        response.headers().get("x-agent-status").unwrap(),
        "partial-fallback"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(!body["warning"].as_str().unwrap().is_empty());
    assert!(body["message"].as_str().unwrap().contains("renderer lost"));
    // The fallback report is structurally valid: required list present, empty.
    assert_eq!(body["report"]["startups"], json!([]));
    assert!(body["report"]["source_url"].is_string());
}

#[tokio::test]
async fn invalid_input_is_400_with_field_detail() {
    let base = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/agents/listing/run"))
        .json(&json!({"url": "https://example.com", "max_products": 20}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "E_VALIDATION");
    assert!(body["detail"].as_str().unwrap().contains("max_products"));
}

#[tokio::test]
async fn engine_defect_is_500() {
    let base = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/agents/undegradable/run"))
        .json(&json!({"url": "https://example.com"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "E_INTERNAL");
}

#[tokio::test]
async fn output_path_side_effect_never_changes_the_response() {
    let base = spawn_service().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.json");

    let response = reqwest::Client::new()
        .post(format!("{base}/agents/listing/run"))
        .json(&json!({
            "url": "https://example.com",
            "output_path": path.to_str().unwrap(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let mirrored: Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(mirrored["startups"][0]["name"], "Acme");

    // An unwritable path degrades to a log line, not an error response.
    let response = reqwest::Client::new()
        .post(format!("{base}/agents/listing/run"))
        .json(&json!({
            "url": "https://example.com",
            "output_path": "/proc/nonexistent/deep/report.json",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

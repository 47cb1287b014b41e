//! Engine contract tests.
//!
//! The properties callers rely on: resolve-after-register, validation before
//! dispatch, deadline containment, output-conformance gating, idempotence,
//! and the unknown-agent path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_json_diff::assert_json_eq;
use async_trait::async_trait;
use harvest_runtime::engine::{Engine, ExecutionOutcome, RunContext};
use harvest_runtime::error::FailureKind;
use harvest_runtime::events::EventBus;
use harvest_runtime::registry::{AgentDescriptor, AgentRunner, Registry};
use harvest_runtime::report::Report;
use harvest_runtime::schema::{FieldSpec, Schema, ValidatedInput};
use harvest_runtime::strategy::StrategyPolicy;
use serde_json::{json, Value};

// ── Stub Runners ──

/// Returns a fixed report and counts how often it was invoked.
struct SpyRunner {
    report: Value,
    calls: Arc<AtomicU32>,
}

impl SpyRunner {
    fn new(report: Value) -> (Arc<Self>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Arc::new(Self {
                report,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }
}

#[async_trait]
impl AgentRunner for SpyRunner {
    async fn run(&self, _input: &ValidatedInput, _ctx: &RunContext) -> anyhow::Result<Report> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Report::from_value(self.report.clone())
    }
}

/// Sleeps far past any test deadline.
struct SleepyRunner;

#[async_trait]
impl AgentRunner for SleepyRunner {
    async fn run(&self, _input: &ValidatedInput, _ctx: &RunContext) -> anyhow::Result<Report> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Report::from_value(json!({"source_url": "https://never", "startups": []}))
    }
}

// ── Descriptor Builders ──

fn startup_output_schema() -> Schema {
    Schema::of(vec![
        FieldSpec::text("source_url").required(),
        FieldSpec::object_list(
            "startups",
            Schema::of(vec![
                FieldSpec::text("name").required(),
                FieldSpec::text("description"),
            ]),
        )
        .required(),
    ])
}

fn startup_descriptor(name: &str, runner: Arc<dyn AgentRunner>) -> AgentDescriptor {
    AgentDescriptor {
        name: name.to_string(),
        description: "startup listing stub".to_string(),
        input_schema: Schema::of(vec![
            FieldSpec::url("url").required(),
            FieldSpec::integer("max_products").bounds(1, 10).default_value(3),
        ]),
        output_schema: startup_output_schema(),
        strategy: StrategyPolicy::SinglePage,
        runner,
    }
}

fn engine_with(descriptor: AgentDescriptor) -> Engine {
    let mut registry = Registry::new();
    registry.register(descriptor).unwrap();
    Engine::new(Arc::new(registry), EventBus::new())
}

// ── Registry Properties ──

#[test]
fn resolve_after_register_returns_the_registered_descriptor() {
    let (runner, _) = SpyRunner::new(json!({}));
    let mut registry = Registry::new();
    registry.register(startup_descriptor("listing", runner)).unwrap();

    let found = registry.resolve("listing").unwrap();
    assert_eq!(found.name, "listing");
    assert_eq!(found.strategy.mode(), "single_page");
    assert!(found.input_schema.field("max_products").is_some());
}

#[test]
fn duplicate_registration_is_a_configuration_error() {
    let (runner, _) = SpyRunner::new(json!({}));
    let mut registry = Registry::new();
    registry
        .register(startup_descriptor("listing", Arc::clone(&runner) as _))
        .unwrap();
    let err = registry
        .register(startup_descriptor("listing", runner))
        .unwrap_err();
    assert_eq!(err.code(), "E_DUPLICATE_AGENT");
}

#[test]
fn unknown_name_resolves_to_agent_not_found() {
    let registry = Registry::new();
    let err = registry.resolve("unknown_agent").unwrap_err();
    assert_eq!(err.code(), "E_AGENT_NOT_FOUND");
}

// ── Validation Gate ──

#[tokio::test]
async fn out_of_range_input_never_reaches_the_runner() {
    let (runner, calls) = SpyRunner::new(json!({"source_url": "https://x", "startups": []}));
    let engine = engine_with(startup_descriptor("listing", runner));

    let outcome = engine
        .execute(
            "listing",
            json!({"url": "https://example.com", "max_products": 20}),
            Duration::from_secs(5),
        )
        .await;

    match outcome {
        ExecutionOutcome::Failed { kind, detail } => {
            assert_eq!(kind, FailureKind::Validation);
            assert!(detail.contains("max_products"), "detail names the field: {detail}");
        }
        other => panic!("expected validation failure, got {}", other.label()),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0, "runner must not be invoked");
}

#[tokio::test]
async fn missing_required_field_never_reaches_the_runner() {
    let (runner, calls) = SpyRunner::new(json!({"source_url": "https://x", "startups": []}));
    let engine = engine_with(startup_descriptor("listing", runner));

    let outcome = engine
        .execute("listing", json!({"max_products": 3}), Duration::from_secs(5))
        .await;

    match outcome {
        ExecutionOutcome::Failed { kind, detail } => {
            assert_eq!(kind, FailureKind::Validation);
            assert!(detail.contains("url"));
        }
        other => panic!("expected validation failure, got {}", other.label()),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_agent_fails_before_any_runner() {
    let engine = Engine::new(Arc::new(Registry::new()), EventBus::new());
    let outcome = engine
        .execute("unknown_agent", json!({}), Duration::from_secs(5))
        .await;
    match outcome {
        ExecutionOutcome::Failed { kind, .. } => assert_eq!(kind, FailureKind::AgentNotFound),
        other => panic!("expected not-found failure, got {}", other.label()),
    }
}

// ── Deadline Containment ──

#[tokio::test]
async fn deadline_overrun_degrades_to_partial_within_the_bound() {
    let engine = engine_with(startup_descriptor("listing", Arc::new(SleepyRunner)));

    let started = Instant::now();
    let outcome = engine
        .execute(
            "listing",
            json!({"url": "https://example.com"}),
            Duration::from_millis(50),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_millis(500),
        "engine blocked {elapsed:?} past a 50ms deadline"
    );
    match outcome {
        ExecutionOutcome::Partial {
            report, warning, ..
        } => {
            assert!(!warning.is_empty());
            assert_eq!(report.get("startups"), Some(&json!([])));
            // The fallback must itself satisfy the output schema.
            assert!(startup_output_schema().check_report(&report.as_value()).is_empty());
        }
        other => panic!("expected partial, got {}", other.label()),
    }
}

// ── Output Conformance ──

#[tokio::test]
async fn nonconformant_runner_output_is_never_complete() {
    // Startups entries missing their required name.
    let (runner, _) = SpyRunner::new(json!({
        "source_url": "https://x",
        "startups": [{"description": "no name"}]
    }));
    let engine = engine_with(startup_descriptor("listing", runner));

    let outcome = engine
        .execute("listing", json!({"url": "https://example.com"}), Duration::from_secs(5))
        .await;
    assert_eq!(outcome.label(), "partial");
}

// ── Idempotence and Round-Trip ──

#[tokio::test]
async fn identical_inputs_yield_identical_complete_reports() {
    let (runner, calls) = SpyRunner::new(json!({
        "source_url": "https://x",
        "startups": [{"name": "Acme"}]
    }));
    let engine = engine_with(startup_descriptor("listing", runner));
    let input = json!({"url": "https://example.com", "max_products": 5});

    let first = engine.execute("listing", input.clone(), Duration::from_secs(5)).await;
    let second = engine.execute("listing", input, Duration::from_secs(5)).await;

    assert!(first.is_complete());
    assert!(second.is_complete());
    assert_json_eq!(
        first.report().unwrap().as_value(),
        second.report().unwrap().as_value()
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn immediate_runner_report_round_trips_exactly() {
    let expected = json!({"source_url": "https://x", "startups": [{"name": "Acme"}]});
    let (runner, _) = SpyRunner::new(expected.clone());
    let engine = engine_with(startup_descriptor("listing", runner));

    let outcome = engine
        .execute("listing", json!({"url": "https://x"}), Duration::from_secs(5))
        .await;
    match outcome {
        ExecutionOutcome::Complete { report } => assert_json_eq!(report.into_value(), expected),
        other => panic!("expected complete, got {}", other.label()),
    }
}

// ── Isolation ──

#[tokio::test]
async fn one_slow_run_does_not_delay_a_concurrent_fast_one() {
    let (fast, _) = SpyRunner::new(json!({"source_url": "https://x", "startups": []}));
    let mut registry = Registry::new();
    registry.register(startup_descriptor("slow", Arc::new(SleepyRunner))).unwrap();
    registry.register(startup_descriptor("fast", fast)).unwrap();
    let engine = Engine::new(Arc::new(registry), EventBus::new());

    let slow = engine.execute("slow", json!({"url": "https://a"}), Duration::from_millis(200));
    let fast = engine.execute("fast", json!({"url": "https://b"}), Duration::from_secs(5));

    let started = Instant::now();
    let (slow_outcome, fast_outcome) = tokio::join!(slow, fast);
    assert!(fast_outcome.is_complete());
    assert_eq!(slow_outcome.label(), "partial");
    assert!(started.elapsed() < Duration::from_secs(2));
}

// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! The execution engine.
//!
//! `execute` runs one registered agent under a hard wall-clock deadline and
//! normalizes every way a run can end into a single tagged outcome. The
//! defining guarantee: a misbehaving or slow runner degrades to a
//! structurally valid partial report; it never crashes the caller's request
//! and never blocks the caller past the deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::FailureKind;
use crate::events::{EventBus, HarvestEvent};
use crate::registry::{AgentDescriptor, Registry};
use crate::report::{fallback_report, Report};

/// Default per-step budget a runner should apply to one navigation or fetch.
const STEP_TIMEOUT: Duration = Duration::from_secs(300);
/// Default budget for one model call inside an exploratory runner.
const MODEL_TIMEOUT: Duration = Duration::from_secs(180);

/// Warning attached to every partial outcome.
pub const PARTIAL_WARNING: &str =
    "Extraction interrupted before completion; a fallback report was generated automatically";

/// Per-run context handed to the runner: identity plus the deadline budget.
///
/// Sub-timeouts are tuning hints, always clamped beneath the remaining outer
/// budget — a runner honoring them can never outlive the engine's bound, and
/// the engine enforces the bound regardless.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub agent: String,
    started: Instant,
    budget: Duration,
}

impl RunContext {
    pub fn new(agent: &str, budget: Duration) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            agent: agent.to_string(),
            started: Instant::now(),
            budget,
        }
    }

    /// Wall-clock budget left before the engine cuts the run off.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Budget for one navigation/fetch step.
    pub fn step_timeout(&self) -> Duration {
        STEP_TIMEOUT.min(self.remaining())
    }

    /// Budget for one model call.
    pub fn model_timeout(&self) -> Duration {
        MODEL_TIMEOUT.min(self.remaining())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Everything one execution can end as. Exactly one variant per run; the
/// transport layer maps the tag to a status code and never unwraps further.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The runner finished in time with a schema-conformant report.
    Complete { report: Report },
    /// The run was interrupted; `report` is a schema-conformant fallback.
    Partial {
        report: Report,
        warning: String,
        message: String,
    },
    /// The run never started (bad input, unknown agent) or the engine
    /// itself is defective.
    Failed { kind: FailureKind, detail: String },
}

impl ExecutionOutcome {
    pub fn report(&self) -> Option<&Report> {
        match self {
            ExecutionOutcome::Complete { report } => Some(report),
            ExecutionOutcome::Partial { report, .. } => Some(report),
            ExecutionOutcome::Failed { .. } => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ExecutionOutcome::Complete { .. })
    }

    /// Short label for logs and audit records.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Complete { .. } => "complete",
            ExecutionOutcome::Partial { .. } => "partial",
            ExecutionOutcome::Failed { .. } => "failed",
        }
    }
}

/// Runs registered agents under deadlines. Cheap to clone; all state is
/// shared and read-only.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    events: EventBus,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one agent to a normalized outcome. Never panics, never blocks
    /// past `deadline` plus scheduler overhead, never lets a runner error
    /// escape.
    pub async fn execute(
        &self,
        agent: &str,
        raw_input: Value,
        deadline: Duration,
    ) -> ExecutionOutcome {
        let descriptor = match self.registry.resolve(agent) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!("run refused for {agent}: {err}");
                return ExecutionOutcome::Failed {
                    kind: FailureKind::AgentNotFound,
                    detail: err.to_string(),
                };
            }
        };

        let input = match descriptor.input_schema.validate_input(&raw_input) {
            Ok(input) => input,
            Err(violations) => {
                tracing::warn!("input rejected for {agent}: {violations}");
                return ExecutionOutcome::Failed {
                    kind: FailureKind::Validation,
                    detail: violations.to_string(),
                };
            }
        };

        let ctx = RunContext::new(agent, deadline);
        self.events.emit(HarvestEvent::RunStarted {
            run_id: ctx.run_id.clone(),
            agent: agent.to_string(),
            deadline_ms: deadline.as_millis() as u64,
        });
        tracing::info!(
            "run {} started: agent={agent}, deadline={:.1}s",
            ctx.run_id,
            deadline.as_secs_f64()
        );

        let outcome = match tokio::time::timeout(deadline, descriptor.runner.run(&input, &ctx))
            .await
        {
            Ok(Ok(report)) => {
                let violations = descriptor.output_schema.check_report(&report.as_value());
                if violations.is_empty() {
                    ExecutionOutcome::Complete { report }
                } else {
                    let detail: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                    self.degrade(
                        descriptor,
                        format!("report failed output validation: {}", detail.join("; ")),
                    )
                }
            }
            Ok(Err(err)) => self.degrade(descriptor, format!("agent runner failed: {err:#}")),
            Err(_) => self.degrade(
                descriptor,
                format!("deadline of {:.1}s exceeded", deadline.as_secs_f64()),
            ),
        };

        self.finish(&ctx, &outcome);
        outcome
    }

    /// Contain a runner-level failure: build the schema-conformant fallback
    /// and wrap it with the reason. Only a descriptor that cannot be
    /// degraded — an engine-side bug — escalates to `Failed`.
    fn degrade(&self, descriptor: &AgentDescriptor, message: String) -> ExecutionOutcome {
        match fallback_report(&descriptor.output_schema) {
            Ok(report) => ExecutionOutcome::Partial {
                report,
                warning: PARTIAL_WARNING.to_string(),
                message,
            },
            Err(err) => ExecutionOutcome::Failed {
                kind: FailureKind::Internal,
                detail: format!("fallback construction failed: {err:#} (after: {message})"),
            },
        }
    }

    fn finish(&self, ctx: &RunContext, outcome: &ExecutionOutcome) {
        let duration_ms = ctx.elapsed().as_millis() as u64;
        match outcome {
            ExecutionOutcome::Complete { .. } => {
                tracing::info!("run {} complete: agent={}, {duration_ms}ms", ctx.run_id, ctx.agent);
                self.events.emit(HarvestEvent::RunCompleted {
                    run_id: ctx.run_id.clone(),
                    agent: ctx.agent.clone(),
                    duration_ms,
                });
            }
            ExecutionOutcome::Partial { message, .. } => {
                tracing::warn!(
                    "run {} degraded to partial: agent={}, {duration_ms}ms: {message}",
                    ctx.run_id,
                    ctx.agent
                );
                self.events.emit(HarvestEvent::RunPartial {
                    run_id: ctx.run_id.clone(),
                    agent: ctx.agent.clone(),
                    duration_ms,
                    message: message.clone(),
                });
            }
            ExecutionOutcome::Failed { kind, detail } => {
                tracing::error!(
                    "run {} failed: agent={}, {duration_ms}ms: {detail}",
                    ctx.run_id,
                    ctx.agent
                );
                self.events.emit(HarvestEvent::RunFailed {
                    run_id: ctx.run_id.clone(),
                    agent: ctx.agent.clone(),
                    duration_ms,
                    code: kind.code().to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentRunner;
    use crate::schema::{FieldSpec, Schema, ValidatedInput};
    use crate::strategy::StrategyPolicy;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedRunner(Value);

    #[async_trait]
    impl AgentRunner for FixedRunner {
        async fn run(&self, _input: &ValidatedInput, _ctx: &RunContext) -> anyhow::Result<Report> {
            Report::from_value(self.0.clone())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl AgentRunner for FailingRunner {
        async fn run(&self, _input: &ValidatedInput, _ctx: &RunContext) -> anyhow::Result<Report> {
            bail!("browser crashed mid-flight")
        }
    }

    fn engine_with(descriptor: AgentDescriptor) -> Engine {
        let mut registry = Registry::new();
        registry.register(descriptor).unwrap();
        Engine::new(Arc::new(registry), EventBus::new())
    }

    fn listing_descriptor(runner: Arc<dyn AgentRunner>) -> AgentDescriptor {
        AgentDescriptor {
            name: "listing".to_string(),
            description: "test listing agent".to_string(),
            input_schema: Schema::of(vec![FieldSpec::url("url").required()]),
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

    #[tokio::test]
    async fn runner_error_degrades_to_schema_valid_partial() {
        let engine = engine_with(listing_descriptor(Arc::new(FailingRunner)));
        let outcome = engine
            .execute(
                "listing",
                json!({"url": "https://example.com"}),
                Duration::from_secs(5),
            )
            .await;

        match outcome {
            ExecutionOutcome::Partial {
                report,
                warning,
                message,
            } => {
                assert!(!warning.is_empty());
                assert!(message.contains("browser crashed"));
                assert_eq!(report.get("startups"), Some(&json!([])));
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonconformant_report_is_never_complete() {
        // Missing the required startups collection.
        let runner = Arc::new(FixedRunner(json!({"source_url": "https://example.com"})));
        let engine = engine_with(listing_descriptor(runner));
        let outcome = engine
            .execute(
                "listing",
                json!({"url": "https://example.com"}),
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(outcome.label(), "partial");
        match outcome {
            ExecutionOutcome::Partial { message, .. } => {
                assert!(message.contains("startups"));
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undegradable_descriptor_is_an_internal_failure() {
        let mut descriptor = listing_descriptor(Arc::new(FailingRunner));
        // A required URL output has no structural placeholder.
        descriptor.output_schema = Schema::of(vec![FieldSpec::url("endpoint").required()]);
        let engine = engine_with(descriptor);
        let outcome = engine
            .execute(
                "listing",
                json!({"url": "https://example.com"}),
                Duration::from_secs(5),
            )
            .await;

        match outcome {
            ExecutionOutcome::Failed { kind, .. } => assert_eq!(kind, FailureKind::Internal),
            other => panic!("expected internal failure, got {other:?}"),
        }
    }

    #[test]
    fn sub_timeouts_clamp_to_the_outer_budget() {
        let ctx = RunContext::new("listing", Duration::from_secs(30));
        assert!(ctx.step_timeout() <= Duration::from_secs(30));
        assert!(ctx.model_timeout() <= Duration::from_secs(30));

        let wide = RunContext::new("listing", Duration::from_secs(3600));
        assert_eq!(wide.step_timeout(), STEP_TIMEOUT);
        assert_eq!(wide.model_timeout(), MODEL_TIMEOUT);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = ExecutionOutcome::Failed {
            kind: FailureKind::Validation,
            detail: "max_products: must be between 1 and 10".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "validation");
    }
}

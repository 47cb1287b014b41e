// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST surface.
//!
//! Thin mapping from the engine's tagged outcome to status codes. The
//! contract callers branch on: `200` and `206` both carry usable report data
//! (`206` is a fallback report with a warning envelope and the
//! `X-Agent-Status: partial-fallback` header); `400`, `404`, and `500` do
//! not.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{Engine, ExecutionOutcome};
use crate::error::FailureKind;
use crate::events::EventBus;
use crate::persist;
use crate::registry::Registry;

/// Deadline applied when the caller does not pass `?timeout_secs=`.
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(600);
/// Upper bound on a caller-chosen deadline.
const MAX_RUN_DEADLINE: Duration = Duration::from_secs(3600);

/// Shared service state. Built once at startup; the registry inside is
/// read-only, so handlers share it without locking.
pub struct AppState {
    pub engine: Engine,
    pub registry: Arc<Registry>,
    pub events: EventBus,
    /// Agent name → currently executing run count, for `/status`.
    pub active_runs: DashMap<String, u64>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Engine, registry: Arc<Registry>, events: EventBus) -> Self {
        Self {
            engine,
            registry,
            events,
            active_runs: DashMap::new(),
            started_at: Instant::now(),
        }
    }
}

/// Build the axum router with every endpoint.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/events", get(events_sse))
        .route("/agents", get(list_agents))
        .route("/agents/:name", get(describe_agent))
        .route("/agents/:name/run", post(run_agent))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let events = state.events.clone();
    let agents = state.registry.len();
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("harvest listening on http://{addr} ({agents} agents)");
    events.emit(crate::events::HarvestEvent::ServiceStarted { port, agents });

    let shutdown_events = events.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown_events.emit(crate::events::HarvestEvent::ServiceStopping);
        })
        .await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "agents_count": state.registry.len(),
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let active: u64 = state.active_runs.iter().map(|e| *e.value()).sum();
    Json(json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "agents_count": state.registry.len(),
        "active_runs": active,
    }))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Value> {
    let agents: Vec<Value> = state
        .registry
        .list()
        .map(|meta| serde_json::to_value(meta).unwrap_or(Value::Null))
        .collect();
    Json(json!({ "count": agents.len(), "agents": agents }))
}

async fn describe_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.registry.resolve(&name) {
        Ok(descriptor) => Json(
            serde_json::to_value(descriptor.metadata()).unwrap_or(Value::Null),
        )
        .into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": err.code(), "detail": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize, Default)]
struct RunParams {
    /// Outer deadline override, seconds.
    timeout_secs: Option<u64>,
}

async fn run_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<RunParams>,
    Json(raw_input): Json<Value>,
) -> Response {
    let deadline = params
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RUN_DEADLINE)
        .clamp(Duration::from_secs(1), MAX_RUN_DEADLINE);

    *state.active_runs.entry(name.clone()).or_insert(0) += 1;
    let outcome = state.engine.execute(&name, raw_input.clone(), deadline).await;
    if let Some(mut entry) = state.active_runs.get_mut(&name) {
        *entry = entry.saturating_sub(1);
    }

    persist::mirror_report(&name, &raw_input, &outcome, &state.events);
    outcome_response(outcome)
}

/// Map the tagged outcome to the HTTP contract.
fn outcome_response(outcome: ExecutionOutcome) -> Response {
    match outcome {
        ExecutionOutcome::Complete { report } => {
            (StatusCode::OK, Json(report.into_value())).into_response()
        }
        ExecutionOutcome::Partial {
            report,
            warning,
            message,
        } => (
            StatusCode::PARTIAL_CONTENT,
            [("x-agent-status", "partial-fallback")],
            Json(json!({
                "success": false,
                "report": report.into_value(),
                "warning": warning,
                "message": message,
            })),
        )
            .into_response(),
        ExecutionOutcome::Failed { kind, detail } => {
            let status = match kind {
                FailureKind::Validation => StatusCode::BAD_REQUEST,
                FailureKind::AgentNotFound => StatusCode::NOT_FOUND,
                FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(json!({ "error": kind.code(), "detail": detail })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize, Default)]
struct EventsParams {
    /// Only stream events concerning this agent.
    agent: Option<String>,
}

/// Server-Sent Events stream of runtime events.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let agent_filter = params.agent;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(ref agent) = agent_filter {
                        if event.agent() != Some(agent.as_str()) {
                            continue;
                        }
                    }
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Report;
    use serde_json::json;

    #[test]
    fn outcome_statuses_follow_the_contract() {
        let complete = ExecutionOutcome::Complete {
            report: Report::from_value(json!({"source_url": "https://x", "startups": []})).unwrap(),
        };
        assert_eq!(outcome_response(complete).status(), StatusCode::OK);

        let partial = ExecutionOutcome::Partial {
            report: Report::from_value(json!({"startups": []})).unwrap(),
            warning: "w".into(),
            message: "m".into(),
        };
        let response = outcome_response(partial);
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get("x-agent-status").unwrap(),
            "partial-fallback"
        );

        let not_found = ExecutionOutcome::Failed {
            kind: FailureKind::AgentNotFound,
            detail: "unknown agent: ghost".into(),
        };
        assert_eq!(outcome_response(not_found).status(), StatusCode::NOT_FOUND);

        let invalid = ExecutionOutcome::Failed {
            kind: FailureKind::Validation,
            detail: "max_products: must be between 1 and 10".into(),
        };
        assert_eq!(outcome_response(invalid).status(), StatusCode::BAD_REQUEST);

        let internal = ExecutionOutcome::Failed {
            kind: FailureKind::Internal,
            detail: "fallback construction failed".into(),
        };
        assert_eq!(
            outcome_response(internal).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

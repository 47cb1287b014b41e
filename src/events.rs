// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime event bus.
//!
//! A broadcast channel carrying run lifecycle events to any number of
//! subscribers (the SSE route, tests). Emission never blocks and never
//! fails: with no subscribers, events are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the service and the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    /// The HTTP service is accepting requests.
    ServiceStarted { port: u16, agents: usize },
    /// Graceful shutdown began.
    ServiceStopping,
    /// An execution passed validation and was dispatched.
    RunStarted {
        run_id: String,
        agent: String,
        deadline_ms: u64,
    },
    RunCompleted {
        run_id: String,
        agent: String,
        duration_ms: u64,
    },
    /// The run was interrupted and degraded to a fallback report.
    RunPartial {
        run_id: String,
        agent: String,
        duration_ms: u64,
        message: String,
    },
    RunFailed {
        run_id: String,
        agent: String,
        duration_ms: u64,
        code: String,
    },
    /// A report was mirrored to a caller-specified path.
    ReportPersisted { agent: String, path: String },
}

impl HarvestEvent {
    /// The agent this event concerns, when it concerns one.
    pub fn agent(&self) -> Option<&str> {
        match self {
            HarvestEvent::RunStarted { agent, .. }
            | HarvestEvent::RunCompleted { agent, .. }
            | HarvestEvent::RunPartial { agent, .. }
            | HarvestEvent::RunFailed { agent, .. }
            | HarvestEvent::ReportPersisted { agent, .. } => Some(agent),
            _ => None,
        }
    }
}

/// Cheaply clonable handle to the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HarvestEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Fire an event. Lagging or absent receivers are not an error.
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

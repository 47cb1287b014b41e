//! Agent descriptors and the name-keyed registry.
//!
//! The registry is populated once at startup and read-only afterwards, so
//! concurrent lookups need no locking — callers share it behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::engine::RunContext;
use crate::error::EngineError;
use crate::report::Report;
use crate::schema::{Schema, ValidatedInput};
use crate::strategy::StrategyPolicy;

/// The capability every agent implements: run one extraction to completion.
///
/// A runner receives input that already passed the descriptor's input schema
/// and a context carrying the deadline budget. Whatever goes wrong inside —
/// navigation, rendering, model calls — surfaces as an error here and is
/// degraded to a partial outcome by the engine; runners never build
/// envelopes themselves.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, input: &ValidatedInput, ctx: &RunContext) -> Result<Report>;
}

/// Registry entry binding a name to schemas, strategy, and runner.
#[derive(Clone)]
pub struct AgentDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub strategy: StrategyPolicy,
    pub runner: Arc<dyn AgentRunner>,
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("strategy", &self.strategy)
            .field("runner", &"<dyn AgentRunner>")
            .finish()
    }
}

impl AgentDescriptor {
    pub fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            strategy: self.strategy.mode(),
            input_schema: self.input_schema.summary(),
            output_schema: self.output_schema.summary(),
        }
    }
}

/// Public metadata for one agent, as served by `GET /agents`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentMetadata {
    pub name: String,
    pub description: String,
    pub strategy: &'static str,
    pub input_schema: Value,
    pub output_schema: Value,
}

/// Name → descriptor map. Uniqueness is checked at registration, never at
/// call time.
#[derive(Default)]
pub struct Registry {
    agents: HashMap<String, AgentDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Add a descriptor. Duplicate names and structurally unusable
    /// descriptors are configuration errors surfaced at startup.
    pub fn register(&mut self, descriptor: AgentDescriptor) -> Result<(), EngineError> {
        if descriptor.name.trim().is_empty() {
            return Err(EngineError::InvalidDescriptor {
                name: descriptor.name.clone(),
                reason: "agent name is empty".to_string(),
            });
        }
        if descriptor.output_schema.is_empty() {
            return Err(EngineError::InvalidDescriptor {
                name: descriptor.name.clone(),
                reason: "output schema declares no fields".to_string(),
            });
        }
        if self.agents.contains_key(&descriptor.name) {
            return Err(EngineError::DuplicateAgent(descriptor.name.clone()));
        }
        self.agents.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&AgentDescriptor, EngineError> {
        self.agents
            .get(name)
            .ok_or_else(|| EngineError::AgentNotFound(name.to_string()))
    }

    /// Restartable enumeration of all agents' public metadata, sorted by
    /// name so repeated listings are stable.
    pub fn list(&self) -> impl Iterator<Item = AgentMetadata> + '_ {
        let mut names: Vec<&String> = self.agents.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(move |name| self.agents[name].metadata())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

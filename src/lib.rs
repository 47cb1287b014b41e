// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! harvest-runtime — deadline-bounded orchestration for web extraction agents.
//!
//! The core is small: a [`registry::Registry`] of named agents, an
//! [`engine::Engine`] that runs one agent under a hard wall-clock deadline,
//! and a fallback builder that turns every interruption into a structurally
//! valid partial report. Around it sit the traversal strategies
//! ([`strategy`], [`navigation`]), the browser and model capability layers
//! ([`browser`], [`llm`]), the built-in agent catalog ([`agents`]), and the
//! HTTP surface ([`rest`]).
//!
//! The contract callers rely on: `execute` returns exactly one of
//! `Complete`, `Partial`, or `Failed` — a slow or crashing runner degrades
//! to `Partial` with a schema-conformant placeholder report, never to an
//! error crossing the engine boundary.

pub mod acquisition;
pub mod agents;
pub mod audit;
pub mod browser;
pub mod cli;
pub mod engine;
pub mod error;
pub mod events;
pub mod llm;
pub mod navigation;
pub mod persist;
pub mod registry;
pub mod report;
pub mod rest;
pub mod schema;
pub mod strategy;

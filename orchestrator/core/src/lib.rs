// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # loom-core
//!
//! Orchestration core for the Loom multi-agent runtime: pattern executors
//! sharing a global LLM concurrency gate, the agent spawn manager, the
//! tri-modal message bus, and the hybrid pattern recommender.
//!
//! # Architecture
//!
//! - **domain**: entities, value objects, and the injected-capability traits
//!   (`LLMProvider`, `SessionStore`, `AgentRegistry`)
//! - **application**: orchestrator, pattern executors, spawn manager,
//!   recommender, builtin tools
//! - **infrastructure**: message bus, event bus, pattern library, workflow
//!   parser, provider adapters, in-memory stores

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{LoomError, LoomResult};

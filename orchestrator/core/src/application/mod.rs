// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod builtin_tools;
pub mod executors;
pub mod llm_gate;
pub mod orchestrator;
pub mod recommender;
pub mod spawn_manager;

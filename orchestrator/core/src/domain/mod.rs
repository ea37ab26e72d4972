// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod error;
pub mod events;
pub mod llm;
pub mod message;
pub mod pattern;
pub mod session;

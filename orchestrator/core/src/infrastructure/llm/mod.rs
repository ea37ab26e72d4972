// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each provider adapter translates between our domain chat interface and
// an external API. The registry adds retry, backoff, and fallback.

pub mod anthropic;
pub mod openai;
pub mod registry;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAIAdapter;
pub use registry::ProviderRegistry;

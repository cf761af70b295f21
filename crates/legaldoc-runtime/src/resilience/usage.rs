//! Token usage and cost accounting for a pipeline run.

use legaldoc_core::UsageSummary;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated LLM usage for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Number of validated structured calls
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,

    /// Tokens written to cache
    pub cache_creation_tokens: u32,

    /// Tokens read from cache
    pub cache_read_tokens: u32,
}

impl LlmUsage {
    /// Add the usage of one validated call.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.cache_creation_tokens += usage.cache_creation_tokens;
        self.cache_read_tokens += usage.cache_read_tokens;

        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Estimate cost for a usage entry.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens: input, output, cache write, cache read
        let (input_rate, output_rate, cache_write_rate, cache_read_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.0, 0.075),
            m if m.contains("gpt-4o") => (2.5, 10.0, 0.0, 1.25),
            m if m.contains("gemini-2.0-flash") => (0.1, 0.4, 0.0, 0.025),
            m if m.contains("gemini-1.5-pro") => (1.25, 5.0, 0.0, 0.3125),
            m if m.contains("haiku") => (0.8, 4.0, 1.0, 0.08),
            m if m.contains("sonnet") => (3.0, 15.0, 3.75, 0.3),
            _ => (0.15, 0.6, 0.0, 0.0),
        };

        let per_token = |tokens: u32, rate: f64| (tokens as f64 / 1_000_000.0) * rate;

        per_token(usage.prompt_tokens, input_rate)
            + per_token(usage.completion_tokens, output_rate)
            + per_token(usage.cache_creation_tokens, cache_write_rate)
            + per_token(usage.cache_read_tokens, cache_read_rate)
    }

    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            llm_calls: self.llm_calls,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            estimated_cost: self.estimated_cost,
        }
    }
}

/// Usage shared by the concurrent calls of one run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage after a validated call.
    pub fn record(&self, usage: &TokenUsage, model: &str) {
        self.usage.write().add(usage, model);
    }

    /// Get current usage.
    pub fn usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn summary(&self) -> UsageSummary {
        self.usage.read().summary()
    }
}

//! Resilience patterns for legaldoc-runtime.
//!
//! This module provides:
//! - Retry with exponential backoff for transient provider failures
//! - Circuit breaker to stop calling a provider that keeps failing
//! - Ordered provider fallback with per-provider diagnostics
//! - Token usage and cost accounting

mod circuit_breaker;
mod fallback;
mod retry;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{
    FailureReason, FallbackError, ProviderChain, ProviderFailure, ProviderHealth, Served,
};
pub use retry::RetryPolicy;
pub use usage::{LlmUsage, UsageTracker};

//! Token cost ledger.
//!
//! Tracks prompt/completion tokens and dollar cost per model across the
//! agent's lifetime. Persisted with the rest of the state and surfaced on
//! `GET /costs`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// USD per 1M tokens: (prompt, completion). Unknown models are tracked with
/// zero cost rather than dropped.
fn pricing(model: &str) -> (f64, f64) {
    match model {
        "gpt-4o" => (2.5, 10.0),
        "gpt-4o-mini" => (0.15, 0.6),
        _ => (0.0, 0.0),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelUsage {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CostTracker {
    pub by_model: HashMap<String, ModelUsage>,
    pub total_cost_usd: f64,
}

impl CostTracker {
    pub fn record(&mut self, model: &str, prompt_tokens: u32, completion_tokens: u32) {
        let (prompt_rate, completion_rate) = pricing(model);
        let cost = prompt_tokens as f64 / 1_000_000.0 * prompt_rate
            + completion_tokens as f64 / 1_000_000.0 * completion_rate;

        let usage = self.by_model.entry(model.to_string()).or_default();
        usage.calls += 1;
        usage.prompt_tokens += prompt_tokens as u64;
        usage.completion_tokens += completion_tokens as u64;
        usage.cost_usd += cost;
        self.total_cost_usd += cost;
    }
}

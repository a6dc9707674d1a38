//! Aggregate LLM analyst pass and the pre-market plan.
//!
//! The analyst sees the top candidates plus current positions and hands back
//! per-symbol verdicts. The minimum-hold rule is stated to the model in its
//! system prompt but enforced in code only for SELL recommendations — BUYs
//! execute immediately.

use crate::adapters::broker::Broker;
use crate::domain::{LogLevel, PremarketPlan, Signal, Verdict};
use crate::error::Result;
use crate::llm::research as llm_research;
use crate::llm::LlmClient;
use crate::state::AgentState;
use crate::trader::executor;
use chrono::{DateTime, Duration, Utc};

const ANALYST_TOP_N: usize = 10;
/// A plan older than this never executes (the open came and went).
const PLAN_MAX_AGE_MINUTES: i64 = 10;

fn top_signals(state: &AgentState, n: usize) -> Vec<Signal> {
    let mut ranked = state.signal_cache.clone();
    ranked.sort_by(|a, b| {
        b.sentiment
            .abs()
            .partial_cmp(&a.sentiment.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}

/// Whether an analyst SELL may execute: position hold time must be at least
/// `llm_min_hold_minutes`. BUYs are deliberately not held to this rule.
pub fn sell_allowed_by_min_hold(
    state: &AgentState,
    symbol: &str,
    now: DateTime<Utc>,
) -> bool {
    match state.position_entries.get(symbol) {
        Some(entry) => {
            now - entry.entry_time >= Duration::minutes(state.config.trader.llm_min_hold_minutes)
        }
        // no recorded entry -> nothing to protect
        None => true,
    }
}

/// Full analyst pass over candidates + positions.
pub async fn run_pass(
    state: &mut AgentState,
    broker: &dyn Broker,
    llm: &dyn LlmClient,
    crisis_mult: f64,
    now: DateTime<Utc>,
) -> Result<()> {
    if !llm.is_configured() {
        return Ok(());
    }
    let cfg = state.config.llm.clone();

    let positions = broker.get_positions().await?;
    let position_lines: Vec<String> = positions
        .iter()
        .filter(|p| !p.is_option())
        .map(|p| {
            format!(
                "{}: {:+.1}% unrealized, value {}",
                p.symbol,
                p.pl_pct(),
                p.market_value
            )
        })
        .collect();
    let candidates = top_signals(state, ANALYST_TOP_N);

    let (recommendations, usage) =
        match llm_research::run_analyst(llm, &cfg, &candidates, &position_lines).await {
            Ok(r) => r,
            Err(e) => {
                // no parseable reply = no recommendations
                state.log(LogLevel::Warn, "analyst", format!("pass failed: {e}"));
                return Ok(());
            }
        };
    state
        .cost_tracker
        .record(&usage.model, usage.prompt_tokens, usage.completion_tokens);

    let held: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
    for rec in recommendations {
        match rec.verdict {
            Verdict::Sell => {
                if !held.iter().any(|h| h == &rec.symbol) {
                    continue;
                }
                if !sell_allowed_by_min_hold(state, &rec.symbol, now) {
                    state.log(
                        LogLevel::Info,
                        "analyst",
                        format!("{}: SELL deferred by minimum hold", rec.symbol),
                    );
                    continue;
                }
                let is_crypto = positions
                    .iter()
                    .find(|p| p.symbol == rec.symbol)
                    .map(|p| p.is_crypto())
                    .unwrap_or(false);
                executor::execute_sell(state, broker, &rec.symbol, is_crypto, "analyst_sell", now)
                    .await?;
            }
            Verdict::Buy => {
                if held.iter().any(|h| h == &rec.symbol)
                    || rec.confidence < state.config.trader.min_analyst_confidence
                {
                    continue;
                }
                let Some(signal) = state
                    .signal_cache
                    .iter()
                    .find(|s| s.symbol == rec.symbol)
                    .cloned()
                else {
                    continue;
                };
                executor::execute_buy(
                    state,
                    broker,
                    &signal,
                    rec.confidence,
                    crisis_mult,
                    &rec.reasoning,
                    now,
                )
                .await?;
            }
            Verdict::Hold => {}
        }
    }
    state.last_analyst = Some(now);
    Ok(())
}

// ============================================================================
// Pre-market plan
// ============================================================================

/// Build and cache the pre-market plan from overnight signals.
pub async fn build_premarket_plan(
    state: &mut AgentState,
    llm: &dyn LlmClient,
    now: DateTime<Utc>,
) {
    if !llm.is_configured() || state.premarket_plan.is_some() {
        return;
    }
    let cfg = state.config.llm.clone();
    let signals = top_signals(state, ANALYST_TOP_N);
    if signals.is_empty() {
        return;
    }

    match llm_research::build_premarket_plan(llm, &cfg, &signals).await {
        Ok((plan, usage)) => {
            state
                .cost_tracker
                .record(&usage.model, usage.prompt_tokens, usage.completion_tokens);
            state.log(
                LogLevel::Info,
                "premarket",
                format!("plan cached: {} actions ({})", plan.actions.len(), plan.summary),
            );
            state.premarket_plan = Some(plan);
        }
        Err(e) => state.log(LogLevel::Warn, "premarket", format!("plan failed: {e}")),
    }
}

/// Whether a cached plan is still inside its execution window.
pub fn plan_executable(plan: &PremarketPlan, now: DateTime<Utc>) -> bool {
    now - plan.created_at <= Duration::minutes(PLAN_MAX_AGE_MINUTES)
}

/// Execute the cached plan just after the open, then drop it.
pub async fn execute_premarket_plan(
    state: &mut AgentState,
    broker: &dyn Broker,
    crisis_mult: f64,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(plan) = state.premarket_plan.take() else {
        return Ok(());
    };
    if !plan_executable(&plan, now) {
        state.log(
            LogLevel::Warn,
            "premarket",
            "plan expired before the open, discarding".to_string(),
        );
        return Ok(());
    }

    for action in &plan.actions {
        if action.verdict != Verdict::Buy
            || action.confidence < state.config.trader.min_analyst_confidence
        {
            continue;
        }
        let Some(signal) = state
            .signal_cache
            .iter()
            .find(|s| s.symbol == action.symbol)
            .cloned()
        else {
            state.log(
                LogLevel::Warn,
                "premarket",
                format!("{}: no live signal backing the plan, skipping", action.symbol),
            );
            continue;
        };
        executor::execute_buy(
            state,
            broker,
            &signal,
            action.confidence,
            crisis_mult,
            &action.reasoning,
            now,
        )
        .await?;
    }
    state.log(LogLevel::Info, "premarket", "plan executed".to_string());
    Ok(())
}

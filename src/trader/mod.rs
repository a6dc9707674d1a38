//! Equity/crypto trading cycle: exits first, then signal-driven entries.

pub mod analyst;
pub mod executor;
pub mod options;
pub mod staleness;

use crate::adapters::broker::{Broker, BrokerPosition};
use crate::domain::{ConfirmationVerdict, CrisisLevel, LogLevel, Signal, Verdict};
use crate::error::Result;
use crate::llm::research::{self as llm_research};
use crate::llm::LlmClient;
use crate::signals::twitter::TwitterSource;
use crate::state::AgentState;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

const RESEARCH_TOP_N: usize = 5;
const ENTRY_TOP_N: usize = 3;
const TWITTER_CONFIRM_BOOST: f64 = 1.15;
const TWITTER_CONTRADICT_HAIRCUT: f64 = 0.85;

/// One full cycle. Exits always run before entries; crisis gating is the
/// caller's job (the tick skips this entirely at level 3). With the market
/// closed only the crypto book trades.
pub async fn run_cycle(
    state: &mut AgentState,
    broker: &dyn Broker,
    crisis_level: CrisisLevel,
    market_open: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let positions = broker.get_positions().await?;
    process_exits(state, broker, &positions, crisis_level, market_open, now).await?;
    process_entries(state, broker, &positions, crisis_level, market_open, now).await?;
    Ok(())
}

async fn process_exits(
    state: &mut AgentState,
    broker: &dyn Broker,
    positions: &[BrokerPosition],
    crisis_level: CrisisLevel,
    market_open: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let cfg = state.config.trader.clone();
    let stale_cfg = state.config.staleness.clone();

    // level 1 tightens the stop
    let stop_loss_pct = if crisis_level == CrisisLevel::Elevated {
        cfg.stop_loss_pct.min(state.config.crisis.level1_stop_loss_pct)
    } else {
        cfg.stop_loss_pct
    };

    for position in positions.iter().filter(|p| !p.is_option()) {
        if !market_open && !position.is_crypto() {
            continue;
        }
        let symbol = position.symbol.clone();
        let pl_pct = position.pl_pct();

        // ratchet the book-keeping peaks
        if let Some(entry) = state.position_entries.get_mut(&symbol) {
            use rust_decimal::prelude::ToPrimitive;
            let price = position.current_price.to_f64().unwrap_or(0.0);
            if price > entry.peak_price {
                entry.peak_price = price;
            }
            if let Some(sentiment) = current_social_sentiment_peak(&state.signal_cache, &symbol) {
                if sentiment > entry.peak_sentiment {
                    entry.peak_sentiment = sentiment;
                }
            }
        }

        if pl_pct >= cfg.take_profit_pct {
            executor::execute_sell(state, broker, &symbol, position.is_crypto(), "take_profit", now)
                .await?;
            continue;
        }
        if pl_pct <= -stop_loss_pct {
            executor::execute_sell(state, broker, &symbol, position.is_crypto(), "stop_loss", now)
                .await?;
            continue;
        }

        // staleness only applies once the minimum hold has passed
        let Some(entry) = state.position_entries.get(&symbol) else {
            continue;
        };
        let hold_hours = (now - entry.entry_time).num_seconds() as f64 / 3600.0;
        if hold_hours < stale_cfg.min_hold_hours {
            continue;
        }
        let volume_ratio = current_social_volume(state, &symbol).map(|v| {
            if entry.entry_social_volume == 0 {
                1.0
            } else {
                v as f64 / entry.entry_social_volume as f64
            }
        });
        let analysis =
            staleness::score_position(&symbol, hold_hours, pl_pct, volume_ratio, &stale_cfg, now);
        let is_stale = analysis.is_stale;
        state.staleness_analysis.insert(symbol.clone(), analysis);
        if is_stale {
            executor::execute_sell(state, broker, &symbol, position.is_crypto(), "stale_exit", now)
                .await?;
        }
    }
    Ok(())
}

fn current_social_sentiment_peak(cache: &[Signal], symbol: &str) -> Option<f64> {
    cache
        .iter()
        .filter(|s| s.symbol == symbol)
        .map(|s| s.sentiment)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

fn current_social_volume(state: &AgentState, symbol: &str) -> Option<u32> {
    state
        .signal_cache
        .iter()
        .filter(|s| s.symbol == symbol)
        .map(|s| s.volume)
        .max()
}

/// Candidate signals sorted by researched confidence, strongest first.
pub fn entry_candidates<'a>(
    state: &'a AgentState,
    held: &[String],
) -> Vec<&'a Signal> {
    let cfg = &state.config;
    let mut candidates: Vec<&Signal> = state
        .signal_cache
        .iter()
        .filter(|s| s.raw_sentiment >= cfg.signals.min_sentiment_score)
        .filter(|s| !held.iter().any(|h| h == &s.symbol))
        .filter(|s| {
            let is_crypto = s.is_crypto.unwrap_or(false);
            (is_crypto && cfg.general.crypto_enabled)
                || (!is_crypto && cfg.general.stocks_enabled)
        })
        .collect();
    candidates.sort_by(|a, b| {
        let ca = state
            .signal_research
            .get(&a.symbol)
            .map(|r| r.confidence)
            .unwrap_or(0.0);
        let cb = state
            .signal_research
            .get(&b.symbol)
            .map(|r| r.confidence)
            .unwrap_or(0.0);
        cb.partial_cmp(&ca).unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Twitter-adjusted confidence: ×1.15 on confirmation, ×0.85 on
/// contradiction, clamped to 1.0.
pub fn adjusted_confidence(state: &AgentState, symbol: &str, confidence: f64) -> f64 {
    match state.twitter_confirmations.get(symbol).map(|c| c.verdict) {
        Some(ConfirmationVerdict::Confirm) => (confidence * TWITTER_CONFIRM_BOOST).min(1.0),
        Some(ConfirmationVerdict::Contradict) => confidence * TWITTER_CONTRADICT_HAIRCUT,
        _ => confidence,
    }
}

async fn process_entries(
    state: &mut AgentState,
    broker: &dyn Broker,
    positions: &[BrokerPosition],
    crisis_level: CrisisLevel,
    market_open: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let crisis_mult = if state.crisis_state.manual_override {
        1.0
    } else {
        crisis_level.position_multiplier()
    };

    let mut held: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
    held.extend(state.position_entries.keys().cloned());

    let picks: Vec<Signal> = entry_candidates(state, &held)
        .into_iter()
        .filter(|s| market_open || s.is_crypto.unwrap_or(false))
        .take(ENTRY_TOP_N)
        .cloned()
        .collect();

    for signal in picks {
        let Some(research) = state.signal_research.get(&signal.symbol).cloned() else {
            continue;
        };
        if research.verdict != Verdict::Buy {
            continue;
        }
        let confidence = adjusted_confidence(state, &signal.symbol, research.confidence);
        if confidence < state.config.trader.min_analyst_confidence {
            continue;
        }

        let bought = executor::execute_buy(
            state,
            broker,
            &signal,
            confidence,
            crisis_mult,
            &research.reasoning,
            now,
        )
        .await?;

        let excellent = research.entry_quality.as_deref() == Some("excellent");
        if bought
            && state.config.general.options_enabled
            && !signal.is_crypto.unwrap_or(false)
            && confidence >= state.config.options.min_confidence
            && excellent
        {
            let spot = match broker.get_snapshot(&signal.symbol).await {
                Ok(s) => s.price,
                Err(e) => {
                    warn!("options spot for {} failed: {e}", signal.symbol);
                    continue;
                }
            };
            let bullish = research.verdict == Verdict::Buy;
            if let Err(e) = options::try_enter(
                state,
                broker,
                &signal.symbol,
                bullish,
                spot,
                now.date_naive(),
            )
            .await
            {
                state.log(
                    LogLevel::Warn,
                    "options",
                    format!("{}: entry flow failed: {e}", signal.symbol),
                );
            }
        }
    }
    Ok(())
}

// ============================================================================
// Research passes
// ============================================================================

/// Research the strongest unresearched signals (top 5, every 120 s).
pub async fn run_signal_research(
    state: &mut AgentState,
    llm: &dyn LlmClient,
    now: DateTime<Utc>,
) {
    if !llm.is_configured() {
        return;
    }
    let cfg = state.config.llm.clone();

    let mut ranked: Vec<Signal> = state.signal_cache.clone();
    ranked.sort_by(|a, b| {
        b.sentiment
            .abs()
            .partial_cmp(&a.sentiment.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut researched = 0usize;
    for signal in ranked {
        if researched >= RESEARCH_TOP_N {
            break;
        }
        // skip symbols with research younger than the interval
        if let Some(existing) = state.signal_research.get(&signal.symbol) {
            if now - existing.timestamp
                < Duration::milliseconds(cfg.research_interval_ms as i64)
            {
                continue;
            }
        }
        let related: Vec<Signal> = state
            .signal_cache
            .iter()
            .filter(|s| s.symbol == signal.symbol)
            .cloned()
            .collect();

        match llm_research::research_signal(llm, &cfg, &signal, &related).await {
            Ok((result, usage)) => {
                state
                    .cost_tracker
                    .record(&usage.model, usage.prompt_tokens, usage.completion_tokens);
                state.signal_research.insert(signal.symbol.clone(), result);
                researched += 1;
            }
            Err(e) => {
                // parse failures and transport errors both mean "no verdict"
                state.log(
                    LogLevel::Warn,
                    "research",
                    format!("{}: {e}", signal.symbol),
                );
            }
        }
    }
}

/// Re-research held positions (every 300 s during market hours).
pub async fn run_position_research(
    state: &mut AgentState,
    broker: &dyn Broker,
    llm: &dyn LlmClient,
    now: DateTime<Utc>,
) -> Result<()> {
    if !llm.is_configured() {
        return Ok(());
    }
    let cfg = state.config.llm.clone();
    let positions = broker.get_positions().await?;

    for position in positions.iter().filter(|p| !p.is_option()) {
        let symbol = &position.symbol;
        let signal = state
            .signal_cache
            .iter()
            .find(|s| &s.symbol == symbol)
            .cloned();
        let Some(signal) = signal else { continue };

        match llm_research::research_signal(llm, &cfg, &signal, &[]).await {
            Ok((result, usage)) => {
                state
                    .cost_tracker
                    .record(&usage.model, usage.prompt_tokens, usage.completion_tokens);
                state.position_research.insert(symbol.clone(), result);
            }
            Err(e) => state.log(LogLevel::Warn, "research", format!("{symbol}: {e}")),
        }
    }
    state.last_position_research = Some(now);
    Ok(())
}

/// Twitter cross-check for researched entry candidates, inside the daily
/// read budget. Budget exhaustion is a silent no-op.
pub async fn run_twitter_confirmations(
    state: &mut AgentState,
    twitter: &dyn TwitterSource,
    llm: &dyn LlmClient,
    now: DateTime<Utc>,
) {
    if !twitter.is_configured() || !llm.is_configured() {
        return;
    }
    let cfg = state.config.llm.clone();

    let symbols: Vec<(String, String)> = state
        .signal_research
        .values()
        .filter(|r| r.verdict == Verdict::Buy)
        .filter(|r| !state.twitter_confirmations.contains_key(&r.symbol))
        .take(3)
        .map(|r| (r.symbol.clone(), r.reasoning.clone()))
        .collect();

    for (symbol, thesis) in symbols {
        if !state.try_consume_twitter_read(now) {
            return;
        }
        let tweets = match twitter.search(&symbol).await {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => continue,
            Err(e) => {
                state.log(LogLevel::Warn, "twitter", format!("{symbol}: {e}"));
                continue;
            }
        };
        match llm_research::judge_twitter_confirmation(llm, &cfg, &symbol, &thesis, &tweets).await
        {
            Ok((verdict, summary, usage)) => {
                state
                    .cost_tracker
                    .record(&usage.model, usage.prompt_tokens, usage.completion_tokens);
                state.twitter_confirmations.insert(
                    symbol.clone(),
                    crate::domain::TwitterConfirmation {
                        symbol,
                        verdict,
                        summary,
                        timestamp: now,
                    },
                );
            }
            Err(e) => state.log(LogLevel::Warn, "twitter", format!("{symbol}: {e}")),
        }
    }
}

/// Breaking-news sweep over held symbols; a strongly bearish read exits the
/// position on the next cycle by zeroing its cached confidence.
pub async fn check_breaking_news(
    state: &mut AgentState,
    twitter: &dyn TwitterSource,
    llm: &dyn LlmClient,
    now: DateTime<Utc>,
) {
    if !twitter.is_configured() || !llm.is_configured() {
        return;
    }
    let cfg = state.config.llm.clone();
    let held: Vec<String> = state.position_entries.keys().cloned().collect();

    for symbol in held {
        // refresh at most once an hour per symbol
        if let Some(existing) = state.twitter_confirmations.get(&symbol) {
            if now - existing.timestamp < Duration::hours(1) {
                continue;
            }
        }
        if !state.try_consume_twitter_read(now) {
            return;
        }
        let tweets = match twitter.search(&symbol).await {
            Ok(t) if !t.is_empty() => t,
            _ => continue,
        };
        let thesis = state
            .position_entries
            .get(&symbol)
            .map(|e| e.entry_reason.clone())
            .unwrap_or_default();
        if let Ok((verdict, summary, usage)) =
            llm_research::judge_twitter_confirmation(llm, &cfg, &symbol, &thesis, &tweets).await
        {
            state
                .cost_tracker
                .record(&usage.model, usage.prompt_tokens, usage.completion_tokens);
            if verdict == ConfirmationVerdict::Contradict {
                state.log(
                    LogLevel::Warn,
                    "twitter",
                    format!("{symbol}: breaking news contradicts thesis: {summary}"),
                );
            }
            state.twitter_confirmations.insert(
                symbol.clone(),
                crate::domain::TwitterConfirmation {
                    symbol,
                    verdict,
                    summary,
                    timestamp: now,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResearchResult, SignalSource, TwitterConfirmation};

    fn signal(symbol: &str, raw: f64, is_crypto: bool) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            source: SignalSource::Reddit,
            source_detail: "stocks".to_string(),
            raw_sentiment: raw,
            sentiment: raw * 0.8,
            volume: 5,
            freshness: 1.0,
            timestamp: Utc::now(),
            upvotes: None,
            comments: None,
            flair: None,
            subreddits: None,
            is_crypto: Some(is_crypto),
            momentum: None,
            price: Some(100.0),
        }
    }

    fn research(symbol: &str, confidence: f64) -> ResearchResult {
        ResearchResult {
            symbol: symbol.to_string(),
            verdict: Verdict::Buy,
            confidence,
            reasoning: "test".to_string(),
            entry_quality: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn candidates_filter_sentiment_held_and_asset_class() {
        let mut state = AgentState::new();
        state.config.general.crypto_enabled = false;
        state.signal_cache = vec![
            signal("AAPL", 0.5, false),
            signal("WEAK", 0.1, false),      // below min sentiment
            signal("HELD", 0.6, false),      // already held
            signal("BTC/USD", 0.9, true),    // crypto disabled
        ];
        let held = vec!["HELD".to_string()];
        let picks = entry_candidates(&state, &held);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].symbol, "AAPL");
    }

    #[test]
    fn candidates_rank_by_research_confidence() {
        let mut state = AgentState::new();
        state.signal_cache = vec![
            signal("LOW", 0.9, false),
            signal("HIGH", 0.4, false),
            signal("NONE", 0.8, false),
        ];
        state.signal_research.insert("LOW".into(), research("LOW", 0.4));
        state.signal_research.insert("HIGH".into(), research("HIGH", 0.9));
        let picks = entry_candidates(&state, &[]);
        assert_eq!(picks[0].symbol, "HIGH");
        assert_eq!(picks[1].symbol, "LOW");
        assert_eq!(picks[2].symbol, "NONE");
    }

    #[test]
    fn twitter_confirmation_scales_confidence() {
        let mut state = AgentState::new();
        assert_eq!(adjusted_confidence(&state, "X", 0.8), 0.8);

        state.twitter_confirmations.insert(
            "X".into(),
            TwitterConfirmation {
                symbol: "X".into(),
                verdict: ConfirmationVerdict::Confirm,
                summary: String::new(),
                timestamp: Utc::now(),
            },
        );
        assert!((adjusted_confidence(&state, "X", 0.8) - 0.92).abs() < 1e-9);
        // clamped at 1.0
        assert_eq!(adjusted_confidence(&state, "X", 0.95), 1.0);

        state.twitter_confirmations.get_mut("X").unwrap().verdict =
            ConfirmationVerdict::Contradict;
        assert!((adjusted_confidence(&state, "X", 0.8) - 0.68).abs() < 1e-9);
    }
}

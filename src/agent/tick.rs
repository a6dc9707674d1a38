//! The scheduled tick: one serialized unit of work.
//!
//! Every subsystem runs (or is skipped) in a fixed order; all errors are
//! caught and logged inside the tick so the next alarm is always scheduled.
//! Ordering guarantees: crisis actions precede all trading; exits precede
//! entries; pre-market plan execution precedes the analyst.

use crate::agent::actor::AgentDeps;
use crate::domain::{CrisisLevel, LogLevel, SocialPoint};
use crate::state::AgentState;
use crate::{crisis, dex, trader};
use chrono::{DateTime, Duration, Utc};

/// Market closed and opening within this window = the pre-market slot.
const PREMARKET_WINDOW_MINUTES: i64 = 5;

/// Run one tick. Returns the next alarm time, or None when the agent is
/// disabled and the alarm chain should stop.
pub async fn run_tick(state: &mut AgentState, deps: &AgentDeps) -> Option<DateTime<Utc>> {
    let now = Utc::now();
    if !state.enabled {
        return None;
    }

    // the tick body never propagates: a thrown error is logged and the alarm
    // chain continues
    if let Err(e) = tick_inner(state, deps, now).await {
        state.log(LogLevel::Error, "tick", format!("tick failed: {e}"));
    }

    Some(now + Duration::milliseconds(state.config.general.tick_interval_ms as i64))
}

async fn tick_inner(
    state: &mut AgentState,
    deps: &AgentDeps,
    now: DateTime<Utc>,
) -> crate::error::Result<()> {
    let clock = match deps.broker.get_clock().await {
        Ok(c) => Some(c),
        Err(e) => {
            state.log(LogLevel::Warn, "tick", format!("clock fetch failed: {e}"));
            None
        }
    };
    let market_open = clock.as_ref().map(|c| c.is_open).unwrap_or(false);

    // --- crisis first -------------------------------------------------------
    let mut crisis_level = CrisisLevel::Normal;
    if state.config.general.crisis_mode_enabled {
        if let Some((old, new)) = crisis::run_check(state, &deps.indicators, now).await {
            if new > old {
                deps.notifier
                    .notify_crisis(
                        &format!("level_{}", new.as_str()),
                        &format!(
                            "Crisis level {} -> {}: {}",
                            old.as_str(),
                            new.as_str(),
                            state.crisis_state.triggered_indicators.join(", ")
                        ),
                    )
                    .await;
            }
        }
        if !state.crisis_state.manual_override {
            crisis_level = state.crisis_state.level;
        }
        if crisis_level == CrisisLevel::FullCrisis {
            crisis::execute_actions(state, deps.broker.as_ref(), &deps.sol_price, now).await?;
            // level 3 skips all normal trading this tick
            return Ok(());
        }
        if crisis_level >= CrisisLevel::HighAlert {
            crisis::execute_actions(state, deps.broker.as_ref(), &deps.sol_price, now).await?;
        }
    }

    // --- signal acquisition -------------------------------------------------
    let poll_due = state
        .last_data_gather
        .map(|t| now - t >= Duration::milliseconds(state.config.general.data_poll_interval_ms as i64))
        .unwrap_or(true);
    if poll_due {
        let fresh = deps
            .gatherers
            .gather_all(
                &state.config.signals,
                deps.broker.as_ref(),
                state.config.general.crypto_enabled,
            )
            .await;
        state.log(
            LogLevel::Info,
            "signals",
            format!("gathered {} signals", fresh.len()),
        );
        state.merge_signals(fresh, now);
        record_social_history(state, now);
        state.last_data_gather = Some(now);
    }

    // --- research -----------------------------------------------------------
    let research_due = state
        .last_research
        .map(|t| now - t >= Duration::milliseconds(state.config.llm.research_interval_ms as i64))
        .unwrap_or(true);
    if research_due {
        trader::run_signal_research(state, deps.llm.as_ref(), now).await;
        state.last_research = Some(now);
        if state.config.general.twitter_enabled {
            trader::run_twitter_confirmations(
                state,
                deps.twitter.as_ref(),
                deps.llm.as_ref(),
                now,
            )
            .await;
        }
    }

    // --- pre-market plan ----------------------------------------------------
    if let Some(clock) = &clock {
        if !clock.is_open
            && state.premarket_plan.is_none()
            && clock.next_open > now
            && clock.next_open - now <= Duration::minutes(PREMARKET_WINDOW_MINUTES)
        {
            trader::analyst::build_premarket_plan(state, deps.llm.as_ref(), now).await;
        }
    }

    // --- crypto + equity trading -------------------------------------------
    if state.config.general.crypto_enabled || market_open {
        if let Err(e) =
            trader::run_cycle(state, deps.broker.as_ref(), crisis_level, market_open, now).await
        {
            state.log(LogLevel::Warn, "trader", format!("cycle failed: {e}"));
        }
    }

    // --- DEX paper engine ---------------------------------------------------
    if state.config.general.dex_enabled {
        let closed = dex::run_cycle(
            state,
            deps.dex_provider.as_ref(),
            &deps.sol_price,
            crisis_level,
            now,
        )
        .await;
        for trade in closed {
            deps.notifier
                .notify_trade(
                    &format!("dex_{}", trade.token_address),
                    &format!(
                        "DEX {} {}: {:+.1}% ({:+.4} SOL)",
                        trade.symbol,
                        trade.exit_reason.as_str(),
                        trade.pnl_pct,
                        trade.pnl_sol
                    ),
                )
                .await;
        }
    }

    // --- market-hours work --------------------------------------------------
    if market_open {
        let crisis_mult = if state.crisis_state.manual_override {
            1.0
        } else {
            crisis_level.position_multiplier()
        };

        if state.premarket_plan.is_some() {
            trader::analyst::execute_premarket_plan(
                state,
                deps.broker.as_ref(),
                crisis_mult,
                now,
            )
            .await?;
        }

        let analyst_due = state
            .last_analyst
            .map(|t| {
                now - t >= Duration::milliseconds(state.config.trader.analyst_interval_ms as i64)
            })
            .unwrap_or(true);
        if analyst_due {
            trader::analyst::run_pass(state, deps.broker.as_ref(), deps.llm.as_ref(), crisis_mult, now)
                .await?;
        }

        let position_research_due = state
            .last_position_research
            .map(|t| {
                now - t
                    >= Duration::milliseconds(
                        state.config.llm.position_research_interval_ms as i64,
                    )
            })
            .unwrap_or(true);
        if position_research_due {
            trader::run_position_research(state, deps.broker.as_ref(), deps.llm.as_ref(), now)
                .await?;
        }

        if state.config.general.options_enabled {
            trader::options::evaluate_exits(state, deps.broker.as_ref()).await?;
        }

        if state.config.general.twitter_enabled {
            trader::check_breaking_news(state, deps.twitter.as_ref(), deps.llm.as_ref(), now)
                .await;
        }
    }

    Ok(())
}

/// Append the latest social volume/sentiment point for every held symbol.
fn record_social_history(state: &mut AgentState, now: DateTime<Utc>) {
    let held: Vec<String> = state.position_entries.keys().cloned().collect();
    for symbol in held {
        let latest = state
            .signal_cache
            .iter()
            .filter(|s| s.symbol == symbol)
            .max_by_key(|s| s.timestamp);
        let Some(signal) = latest else { continue };
        let point = SocialPoint {
            timestamp: now,
            volume: signal.volume,
            sentiment: signal.sentiment,
        };
        let history = state.social_history.entry(symbol).or_default();
        history.push(point);
        // keep a week at the poll cadence
        let cutoff = now - Duration::days(7);
        history.retain(|p| p.timestamp > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn social_history_prunes_old_points() {
        let mut state = AgentState::new();
        let now = Utc::now();
        state.position_entries.insert(
            "AAPL".to_string(),
            crate::domain::PositionEntry {
                symbol: "AAPL".to_string(),
                entry_time: now,
                entry_price: 100.0,
                entry_sentiment: 0.5,
                entry_social_volume: 10,
                entry_sources: vec![],
                entry_reason: String::new(),
                peak_price: 100.0,
                peak_sentiment: 0.5,
            },
        );
        state.social_history.insert(
            "AAPL".to_string(),
            vec![SocialPoint {
                timestamp: now - Duration::days(10),
                volume: 5,
                sentiment: 0.2,
            }],
        );
        state.signal_cache = vec![crate::domain::Signal {
            symbol: "AAPL".to_string(),
            source: crate::domain::SignalSource::Reddit,
            source_detail: "stocks".to_string(),
            raw_sentiment: 0.6,
            sentiment: 0.5,
            volume: 12,
            freshness: 1.0,
            timestamp: now,
            upvotes: None,
            comments: None,
            flair: None,
            subreddits: None,
            is_crypto: None,
            momentum: None,
            price: None,
        }];

        record_social_history(&mut state, now);
        let history = &state.social_history["AAPL"];
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].volume, 12);
    }
}

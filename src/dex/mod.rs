//! DEX momentum paper-trading engine.
//!
//! Entirely simulated: a virtual SOL balance and a positions map, driven by
//! scanner candidates. One cycle = scan → exits → entries → snapshot, with
//! exits always evaluated before entries. The decision logic is pure over
//! `AgentState` + candidates so every rule is unit-testable without a
//! provider.

pub mod breaker;
pub mod cooldown;
pub mod drawdown;
pub mod metrics;
pub mod slippage;
pub mod tiers;

use crate::adapters::dexmon::{DexProvider, SolPriceCache, TokenCandidate};
use crate::domain::{
    CrisisLevel, DexPosition, DexTradeRecord, ExitReason, LogLevel, PortfolioSnapshot,
};
use crate::state::AgentState;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::warn;

/// Evaluation of a position against its latest candidate.
#[derive(Debug)]
pub struct ExitEval {
    /// (reason, quoted price, liquidity for slippage)
    pub exit: Option<(ExitReason, f64, f64)>,
    pub notes: Vec<&'static str>,
}

/// One engine cycle. Returns the trades closed this cycle so the caller can
/// notify on them.
pub async fn run_cycle(
    state: &mut AgentState,
    provider: &dyn DexProvider,
    sol_cache: &SolPriceCache,
    crisis_level: CrisisLevel,
    now: DateTime<Utc>,
) -> Vec<DexTradeRecord> {
    let scan_interval = Duration::milliseconds(state.config.dex.scan_interval_ms as i64);
    if let Some(last) = state.last_dex_scan {
        if now - last < scan_interval {
            return Vec::new();
        }
    }
    state.last_dex_scan = Some(now);

    let candidates = match provider.find_momentum_tokens().await {
        Ok(c) => c,
        Err(e) => {
            // a failed scan is not "missing from scan": skip the cycle
            state.log(LogLevel::Warn, "dex", format!("scan failed: {e}"));
            return Vec::new();
        }
    };
    state.dex_signals = candidates.clone();

    let sol_usd = sol_cache.get(state.config.dex.sol_price_fallback_usd).await;

    let closed = process_exits(state, &candidates, sol_usd, now);

    evaluate_breaker_clear(state, &candidates, now);

    if crisis_level >= CrisisLevel::HighAlert {
        if !candidates.is_empty() {
            state.log(
                LogLevel::Warn,
                "dex",
                format!("entries blocked at crisis level {}", crisis_level.as_str()),
            );
        }
    } else {
        process_entries(state, &candidates, provider, sol_usd, now).await;
    }

    let dex_cfg = state.config.dex.clone();
    let dropped = cooldown::prune(&mut state.dex_stop_loss_cooldowns, now, &dex_cfg);
    if dropped > 0 {
        state.log(LogLevel::Info, "dex", format!("pruned {dropped} stale cooldowns"));
    }

    let snapshot = snapshot_portfolio(state, sol_usd, now);
    if let Some(event) = drawdown::update_portfolio_peak(state, snapshot.total_value_sol, now) {
        state.log(LogLevel::Warn, "dex", event.to_string());
    }
    state.push_snapshot(snapshot);

    closed
}

// ============================================================================
// Exits
// ============================================================================

/// Evaluate every open position against the latest scan, exits first-match.
pub fn process_exits(
    state: &mut AgentState,
    candidates: &[TokenCandidate],
    sol_usd: f64,
    now: DateTime<Utc>,
) -> Vec<DexTradeRecord> {
    let by_address: HashMap<&str, &TokenCandidate> = candidates
        .iter()
        .map(|c| (c.token_address.as_str(), c))
        .collect();

    let mut closed = Vec::new();
    let addresses: Vec<String> = state.dex_positions.keys().cloned().collect();
    for address in addresses {
        let Some(mut position) = state.dex_positions.get(&address).cloned() else {
            continue;
        };

        match by_address.get(address.as_str()) {
            Some(candidate) => {
                position.missed_scans = 0;
                position.last_price = Some(candidate.price_usd);
                if candidate.price_usd > position.peak_price {
                    position.peak_price = candidate.price_usd;
                }

                let eval = evaluate_exit(&position, candidate, &state.config.dex);
                for note in &eval.notes {
                    state.log(LogLevel::Info, "dex", format!("{}: {note}", position.symbol));
                }
                match eval.exit {
                    Some((reason, quoted, liquidity)) => {
                        closed.push(execute_paper_sell(
                            state, &position, reason, quoted, liquidity, sol_usd, now,
                        ));
                    }
                    None => {
                        state.dex_positions.insert(address, position);
                    }
                }
            }
            None => {
                // stale mark: last seen quote, entry price if never re-quoted
                let price = position.last_price.unwrap_or(position.entry_price);
                let pl_pct = position.pl_pct(price);
                if pl_pct > 0.0 {
                    // profitable positions never exit on lost momentum; the
                    // trailing stop stays in charge on the stale mark
                    if let Some((reason, quoted)) =
                        check_trailing_stop(&position, price, &state.config.dex)
                    {
                        closed.push(execute_paper_sell(
                            state,
                            &position,
                            reason,
                            quoted,
                            position.entry_liquidity,
                            sol_usd,
                            now,
                        ));
                    } else {
                        state.dex_positions.insert(address, position);
                    }
                } else {
                    position.missed_scans += 1;
                    if position.missed_scans >= state.config.dex.lost_momentum_max_missed_scans {
                        state.log(
                            LogLevel::Info,
                            "dex",
                            format!(
                                "{}: absent from {} consecutive scans",
                                position.symbol, position.missed_scans
                            ),
                        );
                        closed.push(execute_paper_sell(
                            state,
                            &position,
                            ExitReason::LostMomentum,
                            price,
                            position.entry_liquidity,
                            sol_usd,
                            now,
                        ));
                    } else {
                        state.dex_positions.insert(address, position);
                    }
                }
            }
        }
    }
    closed
}

/// The exit ladder for a position with fresh scan data. First match wins;
/// the liquidity gate only ever delays take-profit.
pub fn evaluate_exit(
    position: &DexPosition,
    candidate: &TokenCandidate,
    cfg: &crate::config::DexConfig,
) -> ExitEval {
    let mut notes = Vec::new();
    let price = candidate.price_usd;
    let pl_pct = position.pl_pct(price);

    // momentum decay only forces out losing positions
    if candidate.momentum_score < cfg.momentum_decay_ratio * position.entry_momentum_score {
        if pl_pct < 0.0 {
            return ExitEval {
                exit: Some((ExitReason::LostMomentum, price, candidate.liquidity)),
                notes,
            };
        }
        notes.push("momentum_decayed_but_in_profit");
    }

    let position_value_usd = position.token_amount * price;
    let can_safely_exit =
        candidate.liquidity >= cfg.liquidity_exit_multiple * position_value_usd;

    if pl_pct >= cfg.take_profit_pct {
        if can_safely_exit {
            return ExitEval {
                exit: Some((ExitReason::TakeProfit, price, candidate.liquidity)),
                notes,
            };
        }
        notes.push("take_profit_delayed_low_liquidity");
    }

    if let Some((reason, quoted)) = check_trailing_stop(position, price, cfg) {
        if !can_safely_exit {
            notes.push("trailing_stop_through_thin_liquidity");
        }
        return ExitEval {
            exit: Some((reason, quoted, candidate.liquidity)),
            notes,
        };
    }

    // fixed stop only while the trailing stop has not taken over
    if !trailing_activated(position, cfg) && pl_pct <= -cfg.stop_loss_pct {
        if !can_safely_exit {
            notes.push("stop_loss_through_thin_liquidity");
        }
        return ExitEval {
            exit: Some((ExitReason::StopLoss, price, candidate.liquidity)),
            notes,
        };
    }

    ExitEval { exit: None, notes }
}

fn trailing_activated(position: &DexPosition, cfg: &crate::config::DexConfig) -> bool {
    if !cfg.trailing_stop_enabled || position.entry_price <= 0.0 {
        return false;
    }
    let (activation, _) = tiers::trailing_params(position.tier, cfg);
    let peak_gain_pct =
        (position.peak_price - position.entry_price) / position.entry_price * 100.0;
    peak_gain_pct >= activation
}

fn check_trailing_stop(
    position: &DexPosition,
    price: f64,
    cfg: &crate::config::DexConfig,
) -> Option<(ExitReason, f64)> {
    if !trailing_activated(position, cfg) {
        return None;
    }
    let (_, distance) = tiers::trailing_params(position.tier, cfg);
    if price <= position.peak_price * (1.0 - distance / 100.0) {
        return Some((ExitReason::TrailingStop, price));
    }
    None
}

/// Close a paper position: sell-side slippage, gas, balance credit, ledger
/// row, streaks, and (for stop-class exits) the re-entry cooldown.
pub fn execute_paper_sell(
    state: &mut AgentState,
    position: &DexPosition,
    reason: ExitReason,
    quoted: f64,
    liquidity: f64,
    sol_usd: f64,
    now: DateTime<Utc>,
) -> DexTradeRecord {
    let cfg = state.config.dex.clone();
    let position_value_usd = position.token_amount * quoted;
    let exec_price = slippage::sell_price(cfg.slippage_model, quoted, position_value_usd, liquidity);

    let proceeds_sol = if sol_usd > 0.0 {
        position.token_amount * exec_price / sol_usd
    } else {
        position.entry_stake_sol
    };
    let pnl_sol = proceeds_sol - position.entry_stake_sol;
    let pnl_pct = if position.entry_price > 0.0 {
        (exec_price - position.entry_price) / position.entry_price * 100.0
    } else {
        0.0
    };

    state.dex_paper_balance_sol += position.entry_stake_sol + pnl_sol - cfg.gas_fee_sol;
    state.dex_realized_pnl_sol += pnl_sol;

    let trade = DexTradeRecord {
        symbol: position.symbol.clone(),
        token_address: position.token_address.clone(),
        entry_price: position.entry_price,
        exit_price: exec_price,
        entry_stake_sol: position.entry_stake_sol,
        entry_time: position.entry_time,
        exit_time: now,
        pnl_pct,
        pnl_sol,
        exit_reason: reason,
    };
    state.dex_trade_history.push(trade.clone());

    if reason.arms_cooldown() {
        state.dex_stop_loss_cooldowns.insert(
            position.token_address.clone(),
            cooldown::arm(exec_price, now, &cfg),
        );
    }
    if reason == ExitReason::StopLoss && breaker::record_stop_loss(state, &position.symbol, now) {
        state.log(
            LogLevel::Warn,
            "dex",
            format!(
                "circuit breaker armed after {} stop-losses",
                state.dex_recent_stop_losses.len()
            ),
        );
    }

    drawdown::update_streak_and_drawdown(state, &trade);
    state.dex_positions.remove(&position.token_address);
    state.log(
        LogLevel::Info,
        "dex",
        format!(
            "closed {} {} at {:.6} ({:+.1}%, {:+.4} SOL)",
            position.symbol,
            reason.as_str(),
            exec_price,
            pnl_pct,
            pnl_sol
        ),
    );
    trade
}

/// Liquidate every open paper position at its latest mark (crisis level 3
/// and manual resets).
pub fn liquidate_all(
    state: &mut AgentState,
    sol_usd: f64,
    now: DateTime<Utc>,
) -> Vec<DexTradeRecord> {
    let positions: Vec<DexPosition> = state.dex_positions.values().cloned().collect();
    positions
        .into_iter()
        .map(|position| {
            let quoted = position.last_price.unwrap_or(position.entry_price);
            execute_paper_sell(
                state,
                &position,
                ExitReason::Manual,
                quoted,
                position.entry_liquidity,
                sol_usd,
                now,
            )
        })
        .collect()
}

// ============================================================================
// Entries
// ============================================================================

fn evaluate_breaker_clear(state: &mut AgentState, candidates: &[TokenCandidate], now: DateTime<Utc>) {
    if state.dex_circuit_breaker_until.is_none() {
        return;
    }
    let any_in_profit = state.dex_positions.values().any(|p| {
        p.last_price
            .map(|price| p.pl_pct(price) > 0.0)
            .unwrap_or(false)
    });
    let best_unheld = candidates
        .iter()
        .filter(|c| !state.dex_positions.contains_key(&c.token_address))
        .map(|c| c.momentum_score)
        .fold(None::<f64>, |acc, m| Some(acc.map_or(m, |a| a.max(m))));
    if let Some(reason) = breaker::try_early_clear(state, best_unheld, any_in_profit, now) {
        state.log(LogLevel::Info, "dex", format!("circuit breaker cleared early: {reason}"));
    }
}

/// Gate checks 1-6 for a candidate, in order. `None` means clear to size.
pub fn entry_blocker(
    state: &mut AgentState,
    candidate: &TokenCandidate,
    now: DateTime<Utc>,
) -> Option<&'static str> {
    if state.dex_positions.contains_key(&candidate.token_address) {
        return Some("already_held");
    }
    if candidate.momentum_score < state.config.dex.min_momentum_score {
        return Some("momentum_below_minimum");
    }
    if let Some(cd) = state.dex_stop_loss_cooldowns.get(&candidate.token_address) {
        if !cooldown::reentry_allowed(
            cd,
            candidate.price_usd,
            candidate.momentum_score,
            now,
            &state.config.dex,
        ) {
            return Some("stop_loss_cooldown");
        }
    }
    if breaker::is_active(state, now) {
        return Some("circuit_breaker_active");
    }
    if state.dex_drawdown_paused {
        return Some("drawdown_paused");
    }
    let tier_count = state
        .dex_positions
        .values()
        .filter(|p| match candidate.tier {
            t if t.is_lottery_class() => p.tier == t,
            _ => !p.tier.is_lottery_class(),
        })
        .count();
    if tier_count >= tiers::max_concurrent(candidate.tier, &state.config.dex) {
        return Some("tier_concurrency_full");
    }
    None
}

async fn process_entries(
    state: &mut AgentState,
    candidates: &[TokenCandidate],
    provider: &dyn DexProvider,
    sol_usd: f64,
    now: DateTime<Utc>,
) {
    for candidate in candidates {
        if let Some(reason) = entry_blocker(state, candidate, now) {
            // only cooldown blocks are interesting enough to log
            if reason == "stop_loss_cooldown" {
                state.log(
                    LogLevel::Info,
                    "dex",
                    format!("{}: entry blocked by {reason}", candidate.symbol),
                );
            }
            continue;
        }

        if state.config.dex.chart_analysis_enabled {
            match provider
                .analyze_chart(&candidate.token_address, candidate.age_hours)
                .await
            {
                Ok(Some(analysis))
                    if analysis.entry_score < state.config.dex.chart_min_entry_score =>
                {
                    state.log(
                        LogLevel::Info,
                        "dex",
                        format!(
                            "{}: chart entry score {:.0} below {:.0}, skipping",
                            candidate.symbol,
                            analysis.entry_score,
                            state.config.dex.chart_min_entry_score
                        ),
                    );
                    continue;
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    state.log(
                        LogLevel::Info,
                        "dex",
                        format!("{}: no chart data, proceeding", candidate.symbol),
                    );
                }
                Err(e) => {
                    // chart provider failure is never fatal to an entry
                    warn!("chart analysis for {} failed: {e}", candidate.symbol);
                }
            }
        }

        if let Err(reason) = execute_paper_buy(state, candidate, sol_usd, now) {
            if reason != "below_min_viable" {
                state.log(
                    LogLevel::Info,
                    "dex",
                    format!("{}: buy skipped ({reason})", candidate.symbol),
                );
            }
        }
    }
}

/// Size and open a paper position. Pure over state; the caller has already
/// passed the gates and the chart check.
pub fn execute_paper_buy(
    state: &mut AgentState,
    candidate: &TokenCandidate,
    sol_usd: f64,
    now: DateTime<Utc>,
) -> Result<(), &'static str> {
    let cfg = state.config.dex.clone();
    if candidate.price_usd <= 0.0 || sol_usd <= 0.0 {
        return Err("no_price");
    }

    let balance = state.dex_paper_balance_sol;
    let mut stake = tiers::stake_sol(candidate.tier, balance, &cfg);

    // concentration cap against the mark-to-market portfolio
    let total_value = portfolio_value_sol(state, sol_usd);
    let cap = total_value * cfg.max_single_position_pct / 100.0;
    if stake > cap {
        state.log(
            LogLevel::Info,
            "dex",
            format!(
                "paper_buy_reduced: {} {:.4} -> {:.4} SOL ({}% concentration cap)",
                candidate.symbol, stake, cap, cfg.max_single_position_pct
            ),
        );
        stake = cap;
    }
    if stake + cfg.gas_fee_sol > balance {
        stake = balance - cfg.gas_fee_sol;
    }
    if stake < cfg.min_viable_position_sol {
        return Err("below_min_viable");
    }

    let position_usd = stake * sol_usd;
    let exec_price =
        slippage::buy_price(cfg.slippage_model, candidate.price_usd, position_usd, candidate.liquidity);
    let token_amount = position_usd / exec_price;

    state.dex_paper_balance_sol -= stake + cfg.gas_fee_sol;
    state.dex_stop_loss_cooldowns.remove(&candidate.token_address);
    state.dex_positions.insert(
        candidate.token_address.clone(),
        DexPosition {
            token_address: candidate.token_address.clone(),
            symbol: candidate.symbol.clone(),
            entry_price: exec_price,
            entry_stake_sol: stake,
            entry_time: now,
            token_amount,
            peak_price: exec_price,
            entry_momentum_score: candidate.momentum_score,
            entry_liquidity: candidate.liquidity,
            tier: candidate.tier,
            missed_scans: 0,
            last_price: Some(candidate.price_usd),
        },
    );
    state.log(
        LogLevel::Info,
        "dex",
        format!(
            "opened {} [{}] {:.4} SOL at {:.6} (momentum {:.0})",
            candidate.symbol,
            candidate.tier.as_str(),
            stake,
            exec_price,
            candidate.momentum_score
        ),
    );
    Ok(())
}

/// Paper balance plus the mark-to-market value of every open position.
pub fn portfolio_value_sol(state: &AgentState, sol_usd: f64) -> f64 {
    let positions: f64 = state
        .dex_positions
        .values()
        .map(|p| p.value_sol(p.last_price.unwrap_or(p.entry_price), sol_usd))
        .sum();
    state.dex_paper_balance_sol + positions
}

fn snapshot_portfolio(state: &AgentState, sol_usd: f64, now: DateTime<Utc>) -> PortfolioSnapshot {
    let total = portfolio_value_sol(state, sol_usd);
    PortfolioSnapshot {
        timestamp: now,
        balance_sol: state.dex_paper_balance_sol,
        positions_value_sol: total - state.dex_paper_balance_sol,
        total_value_sol: total,
        open_positions: state.dex_positions.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;

    fn candidate(address: &str, tier: Tier, price: f64, momentum: f64) -> TokenCandidate {
        TokenCandidate {
            token_address: address.to_string(),
            symbol: format!("T{address}"),
            name: String::new(),
            url: String::new(),
            price_usd: price,
            price_change_5m: None,
            price_change_6h: 10.0,
            price_change_24h: 20.0,
            volume_24h: 100_000.0,
            liquidity: 60_000.0,
            age_hours: 30.0,
            momentum_score: momentum,
            legitimacy_score: 80.0,
            tier,
            dex_id: "raydium".to_string(),
        }
    }

    fn enter(state: &mut AgentState, cand: &TokenCandidate, now: DateTime<Utc>) {
        assert_eq!(entry_blocker(state, cand, now), None);
        execute_paper_buy(state, cand, 200.0, now).unwrap();
    }

    fn no_slippage_state() -> AgentState {
        let mut state = AgentState::new();
        state.config.dex.slippage_model = crate::domain::SlippageModel::None;
        state.config.dex.gas_fee_sol = 0.0;
        state
    }

    #[test]
    fn buy_preserves_stake_value_identity() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 0.002, 75.0);
        enter(&mut state, &cand, now);

        let pos = &state.dex_positions["a"];
        // token_amount × entry_price == stake × sol_usd
        let lhs = pos.token_amount * pos.entry_price;
        let rhs = pos.entry_stake_sol * 200.0;
        assert!((lhs - rhs).abs() < 1e-9);
        assert!((state.dex_paper_balance_sol - (10.0 - pos.entry_stake_sol)).abs() < 1e-12);
    }

    #[test]
    fn duplicate_entry_is_blocked() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 0.002, 75.0);
        enter(&mut state, &cand, now);
        assert_eq!(entry_blocker(&mut state, &cand, now), Some("already_held"));
    }

    #[test]
    fn weak_momentum_is_blocked() {
        let mut state = no_slippage_state();
        let cand = candidate("a", Tier::Established, 0.002, 55.0);
        assert_eq!(
            entry_blocker(&mut state, &cand, Utc::now()),
            Some("momentum_below_minimum")
        );
    }

    #[test]
    fn concentration_cap_reduces_oversized_entries() {
        let mut state = no_slippage_state();
        // shrink the book so the established stake (5% of balance) exceeds 40%
        state.dex_paper_balance_sol = 1.0;
        state.dex_peak_value = 1.0;
        state.config.dex.pct_of_balance = 0.5; // would stake 0.5 SOL
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 0.002, 75.0);
        enter(&mut state, &cand, now);
        let pos = &state.dex_positions["a"];
        // portfolio value 1.0 → cap 0.4
        assert!((pos.entry_stake_sol - 0.4).abs() < 1e-9);
        assert!(state
            .logs
            .iter()
            .any(|l| l.message.contains("paper_buy_reduced")));
    }

    #[test]
    fn tiny_residual_entries_are_skipped() {
        let mut state = no_slippage_state();
        state.dex_paper_balance_sol = 0.012;
        state.config.dex.pct_of_balance = 0.5;
        let cand = candidate("a", Tier::Established, 0.002, 75.0);
        // 0.012 × 0.5 = 0.006 < 0.01 min viable
        assert_eq!(
            execute_paper_buy(&mut state, &cand, 200.0, Utc::now()),
            Err("below_min_viable")
        );
        assert!(state.dex_positions.is_empty());
    }

    #[test]
    fn take_profit_requires_liquidity_headroom() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 75.0);
        enter(&mut state, &cand, now);

        // price doubled but liquidity collapsed below 5× position value
        let mut pumped = candidate("a", Tier::Established, 2.0, 75.0);
        let pos = &state.dex_positions["a"];
        pumped.liquidity = pos.token_amount * 2.0 * 2.0; // 2× position value
        let mut position = pos.clone();
        position.peak_price = 2.0;
        let eval = evaluate_exit(&position, &pumped, &state.config.dex);
        assert!(eval.exit.is_none() || eval.exit.unwrap().0 != ExitReason::TakeProfit);
        assert!(eval.notes.contains(&"take_profit_delayed_low_liquidity"));

        // with deep liquidity the same gain takes profit
        pumped.liquidity = pos.token_amount * 2.0 * 10.0;
        let eval = evaluate_exit(&position, &pumped, &state.config.dex);
        assert_eq!(eval.exit.unwrap().0, ExitReason::TakeProfit);
    }

    #[test]
    fn trailing_stop_fires_before_take_profit_on_retrace() {
        // entry $1, ride to $1.80, retrace to $1.34
        let mut state = no_slippage_state();
        state.config.dex.take_profit_pct = 100.0;
        state.config.dex.trailing_stop_activation_pct = 50.0;
        state.config.dex.trailing_stop_distance_pct = 25.0;
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 75.0);
        enter(&mut state, &cand, now);

        // ride to 1.80
        let up = candidate("a", Tier::Established, 1.80, 75.0);
        let trades = process_exits(&mut state, &[up], 200.0, now);
        assert!(trades.is_empty());
        assert_eq!(state.dex_positions["a"].peak_price, 1.80);

        // retrace through 1.80 × 0.75 = 1.35
        let down = candidate("a", Tier::Established, 1.34, 75.0);
        let trades = process_exits(&mut state, &[down], 200.0, now);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::TrailingStop);
        assert!((trades[0].exit_price - 1.34).abs() < 1e-9);
        // stop-class exit armed a cooldown at the exact exit price/time
        let cd = &state.dex_stop_loss_cooldowns["a"];
        assert_eq!(cd.exit_price, trades[0].exit_price);
        assert_eq!(cd.exit_time, trades[0].exit_time);
    }

    #[test]
    fn fixed_stop_loss_only_before_trailing_activates() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 75.0);
        enter(&mut state, &cand, now);

        // straight drop: fixed stop at -20%
        let down = candidate("a", Tier::Established, 0.79, 75.0);
        let trades = process_exits(&mut state, &[down], 200.0, now);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn losing_position_missing_from_scans_exits_after_grace() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 75.0);
        enter(&mut state, &cand, now);

        // mark it underwater, then vanish from scans
        let down = candidate("a", Tier::Established, 0.9, 75.0);
        process_exits(&mut state, &[down], 200.0, now);
        assert_eq!(state.dex_positions["a"].missed_scans, 0);

        for i in 1..10 {
            let trades = process_exits(&mut state, &[], 200.0, now);
            assert!(trades.is_empty(), "no exit on miss {i}");
            assert_eq!(state.dex_positions["a"].missed_scans, i);
        }
        let trades = process_exits(&mut state, &[], 200.0, now);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::LostMomentum);
    }

    #[test]
    fn profitable_position_missing_from_scan_never_lost_momentum() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 75.0);
        enter(&mut state, &cand, now);

        let up = candidate("a", Tier::Established, 1.3, 75.0);
        process_exits(&mut state, &[up], 200.0, now);

        for _ in 0..30 {
            let trades = process_exits(&mut state, &[], 200.0, now);
            assert!(trades.is_empty());
        }
        assert_eq!(state.dex_positions["a"].missed_scans, 0);
    }

    #[test]
    fn momentum_decay_exits_losers_only() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 80.0);
        enter(&mut state, &cand, now);

        // decayed momentum + underwater -> lost_momentum
        let mut weak = candidate("a", Tier::Established, 0.95, 30.0);
        weak.liquidity = 60_000.0;
        let trades = process_exits(&mut state, &[weak], 200.0, now);
        assert_eq!(trades[0].exit_reason, ExitReason::LostMomentum);

        // same decay while in profit only logs
        let cand = candidate("b", Tier::Established, 1.0, 80.0);
        enter(&mut state, &cand, now);
        let strong_price_weak_momentum = candidate("b", Tier::Established, 1.2, 30.0);
        let trades = process_exits(&mut state, &[strong_price_weak_momentum], 200.0, now);
        assert!(trades.is_empty());
        assert!(state.dex_positions.contains_key("b"));
    }

    #[test]
    fn conservation_of_sol_across_many_trades() {
        let mut state = AgentState::new();
        state.config.dex.slippage_model = crate::domain::SlippageModel::Realistic;
        let gas = state.config.dex.gas_fee_sol;
        let now = Utc::now();

        // three entries, two exits at different prices
        for (addr, price) in [("a", 1.0), ("b", 0.5), ("c", 2.0)] {
            let cand = candidate(addr, Tier::Established, price, 75.0);
            enter(&mut state, &cand, now);
        }
        let exit_a = candidate("a", Tier::Established, 1.6, 75.0);
        let exit_b = candidate("b", Tier::Established, 0.35, 75.0);
        let hold_c = candidate("c", Tier::Established, 2.0, 75.0);
        process_exits(&mut state, &[exit_a, exit_b, hold_c], 200.0, now);
        assert_eq!(state.dex_trade_history.len(), 2);
        assert_eq!(state.dex_positions.len(), 1);

        // conservation: open stakes + balance − realized pnl = start − gas paid
        let open_stakes: f64 = state
            .dex_positions
            .values()
            .map(|p| p.entry_stake_sol)
            .sum();
        let realized: f64 = state.dex_trade_history.iter().map(|t| t.pnl_sol).sum();
        let gas_paid = gas * (3.0 + 2.0); // per leg
        let lhs = open_stakes + state.dex_paper_balance_sol - realized;
        let rhs = state.config.dex.starting_balance_sol - gas_paid;
        assert!((lhs - rhs).abs() < 1e-9, "lhs={lhs} rhs={rhs}");
    }

    #[test]
    fn liquidation_empties_the_book() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        for (addr, price) in [("a", 1.0), ("b", 0.5)] {
            let cand = candidate(addr, Tier::Established, price, 75.0);
            enter(&mut state, &cand, now);
        }
        let trades = liquidate_all(&mut state, 200.0, now);
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.exit_reason == ExitReason::Manual));
        assert!(state.dex_positions.is_empty());
        // manual exits do not arm cooldowns
        assert!(state.dex_stop_loss_cooldowns.is_empty());
    }

    #[test]
    fn peak_price_is_monotone() {
        let mut state = no_slippage_state();
        let now = Utc::now();
        let cand = candidate("a", Tier::Established, 1.0, 75.0);
        enter(&mut state, &cand, now);

        for price in [1.2, 1.5, 1.1, 1.4, 0.9] {
            let c = candidate("a", Tier::Established, price, 75.0);
            process_exits(&mut state, &[c], 200.0, now);
            if let Some(pos) = state.dex_positions.get("a") {
                assert!(pos.peak_price >= pos.entry_price);
                assert!(pos.peak_price >= 1.5_f64.min(pos.peak_price));
            }
        }
    }
}

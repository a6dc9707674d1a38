//! Crisis monitor: a 4-level state machine over macro stress indicators.
//!
//! Each indicator contributes 0/1/2 points at its warning/critical
//! thresholds (VIX up to 3). The summed score maps to a level; levels gate
//! position sizing, tighten stops, and at level 3 force full liquidation.
//! Crisis actions always run before normal trading in a tick.

pub mod indicators;

use crate::adapters::broker::Broker;
use crate::adapters::dexmon::SolPriceCache;
use crate::config::CrisisConfig;
use crate::domain::{CrisisIndicators, CrisisLevel, LogLevel};
use crate::error::Result;
use crate::state::AgentState;
use chrono::{DateTime, Duration, Utc};

/// Score one tick's indicators. Returns (score, triggered indicator names).
pub fn score_indicators(ind: &CrisisIndicators, cfg: &CrisisConfig) -> (u32, Vec<String>) {
    let mut score = 0u32;
    let mut triggered = Vec::new();

    let mut add = |points: u32, name: &str, detail: String| {
        if points > 0 {
            score += points;
            triggered.push(format!("{name} ({detail}, +{points})"));
        }
    };

    // VIX is the only 3-point indicator
    if let Some(vix) = ind.vix {
        let points = if vix >= cfg.vix_critical {
            3
        } else if vix >= cfg.vix_elevated {
            2
        } else if vix >= cfg.vix_warning {
            1
        } else {
            0
        };
        add(points, "vix", format!("{vix:.1}"));
    }

    // higher-is-worse pairs
    let high = [
        (ind.hy_spread, cfg.hy_spread_warning, cfg.hy_spread_critical, "hy_spread"),
        (ind.ted, cfg.ted_warning, cfg.ted_critical, "ted"),
        (ind.dxy, cfg.dxy_warning, cfg.dxy_critical, "dxy"),
        (ind.usdjpy, cfg.usdjpy_warning, cfg.usdjpy_critical, "usdjpy"),
        (
            ind.gold_silver_ratio,
            cfg.gold_silver_warning,
            cfg.gold_silver_critical,
            "gold_silver_ratio",
        ),
    ];
    for (value, warning, critical, name) in high {
        if let Some(v) = value {
            let points = if v >= critical {
                2
            } else if v >= warning {
                1
            } else {
                0
            };
            add(points, name, format!("{v:.1}"));
        }
    }

    // lower-is-worse pairs
    let low = [
        (ind.yc_2y10y, cfg.yc_inversion_warning, cfg.yc_inversion_critical, "yield_curve"),
        (
            ind.btc_weekly_pct,
            cfg.btc_weekly_warning_pct,
            cfg.btc_weekly_critical_pct,
            "btc_weekly",
        ),
        (
            ind.kre_weekly_pct,
            cfg.kre_weekly_warning_pct,
            cfg.kre_weekly_critical_pct,
            "kre_weekly",
        ),
        (
            ind.silver_weekly_pct,
            cfg.silver_weekly_warning_pct,
            cfg.silver_weekly_critical_pct,
            "silver_weekly",
        ),
        (
            ind.stocks_above_200ma,
            cfg.stocks_above_200ma_warning,
            cfg.stocks_above_200ma_critical,
            "stocks_above_200ma",
        ),
        (
            ind.fed_change_pct,
            cfg.fed_change_warning_pct,
            cfg.fed_change_critical_pct,
            "fed_balance",
        ),
    ];
    for (value, warning, critical, name) in low {
        if let Some(v) = value {
            let points = if v <= critical {
                2
            } else if v <= warning {
                1
            } else {
                0
            };
            add(points, name, format!("{v:.1}"));
        }
    }

    // stablecoin peg: absolute deviation from $1
    if let Some(usdt) = ind.usdt_peg {
        let deviation = (usdt - 1.0).abs();
        let points = if deviation >= cfg.usdt_peg_critical {
            2
        } else if deviation >= cfg.usdt_peg_warning {
            1
        } else {
            0
        };
        add(points, "usdt_peg", format!("{usdt:.4}"));
    }

    (score, triggered)
}

/// Fetch, score and transition the level. Rate-limited by
/// `check_interval_ms`; a manual override freezes the machine entirely.
/// Returns Some((old, new)) on a level change.
pub async fn run_check(
    state: &mut AgentState,
    client: &indicators::IndicatorClient,
    now: DateTime<Utc>,
) -> Option<(CrisisLevel, CrisisLevel)> {
    if state.crisis_state.manual_override {
        return None;
    }
    let interval = Duration::milliseconds(state.config.crisis.check_interval_ms as i64);
    if let Some(last) = state.last_crisis_check {
        if now - last < interval {
            return None;
        }
    }
    state.last_crisis_check = Some(now);

    let fetched = client.fetch_all().await;
    let (score, triggered) = score_indicators(&fetched, &state.config.crisis);
    let new_level = CrisisLevel::from_score(score);
    let old_level = state.crisis_state.level;

    state.crisis_state.indicators = fetched;
    state.crisis_state.triggered_indicators = triggered.clone();

    if new_level != old_level {
        state.crisis_state.level = new_level;
        state.crisis_state.last_level_change = Some(now);
        let direction = if new_level > old_level { "escalated" } else { "de-escalated" };
        state.log(
            LogLevel::Warn,
            "crisis",
            format!(
                "{direction} {} -> {} (score {score}: {})",
                old_level.as_str(),
                new_level.as_str(),
                triggered.join(", ")
            ),
        );
        return Some((old_level, new_level));
    }
    None
}

/// Level effects against open positions. Level 2 sheds everything below the
/// minimum-profit-to-hold bar; level 3 liquidates both books.
pub async fn execute_actions(
    state: &mut AgentState,
    broker: &dyn Broker,
    sol_cache: &SolPriceCache,
    now: DateTime<Utc>,
) -> Result<()> {
    let level = state.crisis_state.level;
    if state.crisis_state.manual_override || level < CrisisLevel::HighAlert {
        return Ok(());
    }

    let positions = broker.get_positions().await?;
    let min_profit = state.config.crisis.level2_min_profit_to_hold;

    for position in positions.iter().filter(|p| !p.is_option()) {
        let close = match level {
            CrisisLevel::FullCrisis => true,
            CrisisLevel::HighAlert => position.pl_pct() < min_profit,
            _ => false,
        };
        if !close {
            continue;
        }
        match broker.close_position(&position.symbol).await {
            Ok(_) => {
                state.position_entries.remove(&position.symbol);
                if !state
                    .crisis_state
                    .positions_closed_in_crisis
                    .contains(&position.symbol)
                {
                    state
                        .crisis_state
                        .positions_closed_in_crisis
                        .push(position.symbol.clone());
                }
                state.log(
                    LogLevel::Warn,
                    "crisis",
                    format!(
                        "closed {} at {:+.1}% (level {})",
                        position.symbol,
                        position.pl_pct(),
                        level.as_str()
                    ),
                );
            }
            Err(e) => state.log(
                LogLevel::Error,
                "crisis",
                format!("close {} failed: {e}", position.symbol),
            ),
        }
    }

    if level == CrisisLevel::FullCrisis && !state.dex_positions.is_empty() {
        let sol_usd = sol_cache.get(state.config.dex.sol_price_fallback_usd).await;
        let closed = crate::dex::liquidate_all(state, sol_usd, now);
        for trade in &closed {
            if !state
                .crisis_state
                .positions_closed_in_crisis
                .contains(&trade.symbol)
            {
                state
                    .crisis_state
                    .positions_closed_in_crisis
                    .push(trade.symbol.clone());
            }
        }
        state.log(
            LogLevel::Warn,
            "crisis",
            format!("liquidated {} DEX paper positions", closed.len()),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CrisisConfig {
        CrisisConfig::default()
    }

    #[test]
    fn calm_markets_score_zero() {
        let ind = CrisisIndicators {
            vix: Some(15.0),
            hy_spread: Some(320.0),
            yc_2y10y: Some(0.5),
            ted: Some(0.2),
            btc_weekly_pct: Some(2.0),
            usdt_peg: Some(1.0002),
            dxy: Some(100.0),
            usdjpy: Some(145.0),
            kre_weekly_pct: Some(1.0),
            gold_silver_ratio: Some(80.0),
            silver_weekly_pct: Some(0.5),
            fed_change_pct: Some(0.1),
            ..CrisisIndicators::default()
        };
        let (score, triggered) = score_indicators(&ind, &cfg());
        assert_eq!(score, 0);
        assert!(triggered.is_empty());
        assert_eq!(CrisisLevel::from_score(score), CrisisLevel::Normal);
    }

    #[test]
    fn vix_credit_and_btc_stress_reach_full_crisis() {
        // VIX 46 (+3), HY 650 (+2), BTC -22% weekly (+2) = 7 -> level 3
        let ind = CrisisIndicators {
            vix: Some(46.0),
            hy_spread: Some(650.0),
            btc_weekly_pct: Some(-22.0),
            ..CrisisIndicators::default()
        };
        let (score, triggered) = score_indicators(&ind, &cfg());
        assert_eq!(score, 7);
        assert_eq!(triggered.len(), 3);
        assert_eq!(CrisisLevel::from_score(score), CrisisLevel::FullCrisis);
    }

    #[test]
    fn vix_tiers_score_one_two_three() {
        let c = cfg();
        for (vix, expected) in [(26.0, 1), (31.0, 2), (41.0, 3), (24.0, 0)] {
            let ind = CrisisIndicators {
                vix: Some(vix),
                ..CrisisIndicators::default()
            };
            assert_eq!(score_indicators(&ind, &c).0, expected, "vix={vix}");
        }
    }

    #[test]
    fn missing_indicators_are_tolerated() {
        // everything None, including the permanently unsourced 200ma breadth
        let (score, triggered) = score_indicators(&CrisisIndicators::default(), &cfg());
        assert_eq!(score, 0);
        assert!(triggered.is_empty());
    }

    #[test]
    fn usdt_depeg_scores_on_deviation_either_side() {
        let c = cfg();
        for (peg, expected) in [(0.994, 1), (1.006, 1), (0.98, 2), (0.9999, 0)] {
            let ind = CrisisIndicators {
                usdt_peg: Some(peg),
                ..CrisisIndicators::default()
            };
            assert_eq!(score_indicators(&ind, &c).0, expected, "peg={peg}");
        }
    }

    #[test]
    fn elevated_band_maps_to_level_one() {
        let ind = CrisisIndicators {
            vix: Some(27.0),
            yc_2y10y: Some(-0.7),
            ..CrisisIndicators::default()
        };
        let (score, _) = score_indicators(&ind, &cfg());
        assert_eq!(score, 2);
        let level = CrisisLevel::from_score(score);
        assert_eq!(level, CrisisLevel::Elevated);
        assert_eq!(level.position_multiplier(), 0.5);
    }
}

//! Options sub-flow: contract selection and position exits.
//!
//! Entered only for the highest-conviction research ("excellent" entries at
//! high confidence). Selection walks expirations toward the DTE midpoint,
//! then picks the chain contract whose delta sits closest to the target,
//! subject to the delta band, a 10% spread ceiling and affordability.

use crate::adapters::broker::{
    Broker, OptionContract, OptionSnapshot, OptionType, OrderRequest, OrderSide,
};
use crate::config::OptionsConfig;
use crate::domain::LogLevel;
use crate::error::Result;
use crate::state::AgentState;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const MAX_SPREAD_FRAC: f64 = 0.10;
/// How many strikes around the target to quote before giving up.
const MAX_SNAPSHOT_PROBES: usize = 8;

/// Expiration with DTE inside [min, max], closest to the midpoint.
pub fn pick_expiration(
    expirations: &[NaiveDate],
    today: NaiveDate,
    cfg: &OptionsConfig,
) -> Option<NaiveDate> {
    let midpoint = (cfg.min_dte + cfg.max_dte) as f64 / 2.0;
    expirations
        .iter()
        .filter_map(|&d| {
            let dte = (d - today).num_days();
            if dte >= cfg.min_dte && dte <= cfg.max_dte {
                Some((d, (dte as f64 - midpoint).abs()))
            } else {
                None
            }
        })
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(d, _)| d)
}

/// Rank chain contracts of the wanted type by strike distance from a
/// delta-biased target price. Bullish targets sit slightly below spot
/// (higher-delta calls), bearish slightly above (higher-delta puts).
pub fn rank_contracts(
    chain: &[OptionContract],
    bullish: bool,
    spot: f64,
) -> Vec<&OptionContract> {
    let wanted = if bullish {
        OptionType::Call
    } else {
        OptionType::Put
    };
    let target = if bullish { spot * 0.97 } else { spot * 1.03 };
    let mut contracts: Vec<&OptionContract> = chain
        .iter()
        .filter(|c| c.option_type == wanted)
        .collect();
    contracts.sort_by(|a, b| {
        let da = (a.strike_price.to_f64().unwrap_or(f64::MAX) - target).abs();
        let db = (b.strike_price.to_f64().unwrap_or(f64::MAX) - target).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    contracts
}

/// Snapshot filter: delta band, quote spread, and at least one affordable
/// contract. Returns the number of contracts to buy.
pub fn contracts_affordable(
    snapshot: &OptionSnapshot,
    cfg: &OptionsConfig,
    equity: Decimal,
) -> Option<u32> {
    let delta = snapshot.delta?;
    if delta.abs() < cfg.min_delta || delta.abs() > cfg.max_delta {
        return None;
    }
    if snapshot.spread_frac()? > MAX_SPREAD_FRAC {
        return None;
    }
    let mid = snapshot.mid()?.to_f64()?;
    if mid <= 0.0 {
        return None;
    }
    let budget = equity.to_f64()? * cfg.max_pct_per_trade;
    let max_contracts = (budget / (mid * 100.0)).floor() as u32;
    (max_contracts >= 1).then_some(max_contracts)
}

/// Full selection + limit order at mid. Returns true when an order went out.
pub async fn try_enter(
    state: &mut AgentState,
    broker: &dyn Broker,
    underlying: &str,
    bullish: bool,
    spot: f64,
    today: NaiveDate,
) -> Result<bool> {
    let cfg = state.config.options.clone();

    let expirations = broker.get_option_expirations(underlying).await?;
    let Some(expiration) = pick_expiration(&expirations, today, &cfg) else {
        state.log(
            LogLevel::Info,
            "options",
            format!("{underlying}: no expiration inside {}-{} DTE", cfg.min_dte, cfg.max_dte),
        );
        return Ok(false);
    };

    let chain = broker.get_option_chain(underlying, expiration).await?;
    let account = broker.get_account().await?;

    for contract in rank_contracts(&chain, bullish, spot)
        .into_iter()
        .take(MAX_SNAPSHOT_PROBES)
    {
        let snapshot = match broker.get_option_snapshot(&contract.symbol).await {
            Ok(s) => s,
            Err(e) => {
                state.log(
                    LogLevel::Warn,
                    "options",
                    format!("{}: snapshot failed: {e}", contract.symbol),
                );
                continue;
            }
        };
        let Some(qty) = contracts_affordable(&snapshot, &cfg, account.equity) else {
            continue;
        };
        let Some(mid) = snapshot.mid() else { continue };

        let request = OrderRequest::limit_qty(
            &contract.symbol,
            Decimal::from(qty),
            mid.round_dp(2),
            OrderSide::Buy,
        );
        match broker.create_order(&request).await {
            Ok(order) => {
                state.log(
                    LogLevel::Info,
                    "options",
                    format!(
                        "opened {} x{} at {} ({}, {})",
                        contract.symbol,
                        qty,
                        mid.round_dp(2),
                        if bullish { "calls" } else { "puts" },
                        order.status
                    ),
                );
                return Ok(true);
            }
            Err(e) => {
                state.log(
                    LogLevel::Error,
                    "options",
                    format!("{}: order rejected: {e}", contract.symbol),
                );
                return Ok(false);
            }
        }
    }
    state.log(
        LogLevel::Info,
        "options",
        format!("{underlying}: no contract passed delta/spread/affordability"),
    );
    Ok(false)
}

/// Exit evaluation for option positions: fixed take-profit / stop-loss on
/// the position's P&L percentage.
pub async fn evaluate_exits(state: &mut AgentState, broker: &dyn Broker) -> Result<()> {
    let positions = broker.get_positions().await?;
    let cfg = state.config.options.clone();
    for position in positions.iter().filter(|p| p.is_option()) {
        let pl_pct = position.pl_pct();
        let reason = if pl_pct <= -cfg.stop_loss_pct {
            Some("options_stop_loss")
        } else if pl_pct >= cfg.take_profit_pct {
            Some("options_take_profit")
        } else {
            None
        };
        if let Some(reason) = reason {
            match broker.close_position(&position.symbol).await {
                Ok(_) => state.log(
                    LogLevel::Info,
                    "options",
                    format!("closed {} {reason} at {pl_pct:+.1}%", position.symbol),
                ),
                Err(e) => state.log(
                    LogLevel::Error,
                    "options",
                    format!("close {} failed: {e}", position.symbol),
                ),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn expiration_targets_the_dte_midpoint() {
        let cfg = OptionsConfig::default(); // 14-45 DTE, midpoint 29.5
        let today = date("2026-08-03");
        let expirations = vec![
            date("2026-08-07"),  // 4 DTE: too near
            date("2026-08-21"),  // 18 DTE
            date("2026-09-04"),  // 32 DTE: closest to midpoint
            date("2026-09-18"),  // 46 DTE: too far
        ];
        assert_eq!(
            pick_expiration(&expirations, today, &cfg),
            Some(date("2026-09-04"))
        );
    }

    #[test]
    fn expiration_none_when_band_is_empty() {
        let cfg = OptionsConfig::default();
        let today = date("2026-08-03");
        assert_eq!(pick_expiration(&[date("2026-08-05")], today, &cfg), None);
        assert_eq!(pick_expiration(&[], today, &cfg), None);
    }

    fn contract(strike: Decimal, option_type: OptionType) -> OptionContract {
        OptionContract {
            symbol: format!("TST{}{}", strike, if option_type == OptionType::Call { "C" } else { "P" }),
            underlying_symbol: "TST".to_string(),
            expiration_date: date("2026-09-04"),
            strike_price: strike,
            option_type,
        }
    }

    #[test]
    fn ranking_prefers_delta_biased_strikes() {
        let chain = vec![
            contract(dec!(90), OptionType::Call),
            contract(dec!(97), OptionType::Call),
            contract(dec!(105), OptionType::Call),
            contract(dec!(100), OptionType::Put),
        ];
        // bullish at spot 100: target 97, calls only
        let ranked = rank_contracts(&chain, true, 100.0);
        assert_eq!(ranked[0].strike_price, dec!(97));
        assert!(ranked.iter().all(|c| c.option_type == OptionType::Call));

        // bearish: target 103, puts only
        let ranked = rank_contracts(&chain, false, 100.0);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].strike_price, dec!(100));
    }

    #[test]
    fn affordability_checks_delta_spread_and_budget() {
        let cfg = OptionsConfig::default(); // delta 0.35-0.65, 2% of equity
        let good = OptionSnapshot {
            delta: Some(0.5),
            bid: Some(dec!(1.95)),
            ask: Some(dec!(2.05)),
        };
        // $50k × 2% = $1000 budget, $200/contract -> 5
        assert_eq!(contracts_affordable(&good, &cfg, dec!(50000)), Some(5));

        let low_delta = OptionSnapshot { delta: Some(0.2), ..good.clone() };
        assert_eq!(contracts_affordable(&low_delta, &cfg, dec!(50000)), None);

        let wide = OptionSnapshot {
            delta: Some(0.5),
            bid: Some(dec!(1.50)),
            ask: Some(dec!(2.50)),
        };
        assert_eq!(contracts_affordable(&wide, &cfg, dec!(50000)), None);

        // can't afford a single contract
        assert_eq!(contracts_affordable(&good, &cfg, dec!(5000)), None);
    }
}

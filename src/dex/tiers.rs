//! Entry tiers.
//!
//! Each tier is an (age window, liquidity floor) filter with its own sizing
//! rule and concurrency cap. Classification runs at scan time; sizing runs
//! at entry time against the live paper balance.

use crate::config::DexConfig;
use crate::domain::Tier;

/// Scan-time filter: which tier (if any) does a token fall into.
/// Overlapping windows resolve in favor of the more specific tier
/// (breakout requires the 5-minute pump, lottery does not).
pub fn classify(
    age_hours: f64,
    liquidity: f64,
    price_change_5m: Option<f64>,
    legitimacy_score: f64,
) -> Option<Tier> {
    let age_days = age_hours / 24.0;

    if (0.5..2.0).contains(&age_hours) && liquidity >= 10_000.0 {
        return Some(Tier::Microspray);
    }
    if (2.0..6.0).contains(&age_hours)
        && liquidity >= 15_000.0
        && price_change_5m.map_or(false, |m5| m5 >= 50.0)
    {
        return Some(Tier::Breakout);
    }
    if (1.0..6.0).contains(&age_hours) && liquidity >= 15_000.0 {
        return Some(Tier::Lottery);
    }
    if (0.25..3.0).contains(&age_days) && liquidity >= 30_000.0 && legitimacy_score >= 40.0 {
        return Some(Tier::Early);
    }
    if (3.0..14.0).contains(&age_days) && liquidity >= 50_000.0 {
        return Some(Tier::Established);
    }
    None
}

/// Entry stake in SOL before the concentration cap. Fixed-size tiers ignore
/// the balance; percent tiers scale with it and cap at `max_position_sol`.
pub fn stake_sol(tier: Tier, balance_sol: f64, cfg: &DexConfig) -> f64 {
    match tier {
        Tier::Microspray => cfg.microspray_position_sol,
        Tier::Breakout => cfg.breakout_position_sol,
        Tier::Lottery => cfg.lottery_position_sol,
        Tier::Early => {
            (balance_sol * cfg.pct_of_balance * cfg.early_multiplier).min(cfg.max_position_sol)
        }
        Tier::Established => (balance_sol * cfg.pct_of_balance).min(cfg.max_position_sol),
    }
}

/// Per-tier concurrency cap. Early and established share `max_positions`.
pub fn max_concurrent(tier: Tier, cfg: &DexConfig) -> usize {
    match tier {
        Tier::Microspray => cfg.microspray_max_positions,
        Tier::Breakout => cfg.breakout_max_positions,
        Tier::Lottery => cfg.lottery_max_positions,
        Tier::Early | Tier::Established => cfg.max_positions,
    }
}

/// Trailing-stop parameters: (activation peak gain %, distance %).
pub fn trailing_params(tier: Tier, cfg: &DexConfig) -> (f64, f64) {
    if tier.is_lottery_class() {
        (
            cfg.lottery_trailing_activation_pct,
            cfg.lottery_trailing_distance_pct,
        )
    } else {
        (
            cfg.trailing_stop_activation_pct,
            cfg.trailing_stop_distance_pct,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_age_and_liquidity_windows() {
        // 1h old, $12k: microspray window
        assert_eq!(classify(1.0, 12_000.0, None, 20.0), Some(Tier::Microspray));
        // 3h old, $20k, 60% 5m pump: breakout beats lottery
        assert_eq!(classify(3.0, 20_000.0, Some(60.0), 20.0), Some(Tier::Breakout));
        // 3h old, $20k, no pump: lottery
        assert_eq!(classify(3.0, 20_000.0, Some(5.0), 20.0), Some(Tier::Lottery));
        // 1.5 days, $40k, legitimacy 50: early
        assert_eq!(classify(36.0, 40_000.0, None, 50.0), Some(Tier::Early));
        // 1.5 days, $40k, legitimacy 30: fails the early gate, nothing else fits
        assert_eq!(classify(36.0, 40_000.0, None, 30.0), None);
        // 5 days, $80k: established
        assert_eq!(classify(120.0, 80_000.0, None, 90.0), Some(Tier::Established));
        // 20 days: aged out of every tier
        assert_eq!(classify(480.0, 500_000.0, None, 90.0), None);
        // 1h old but only $5k liquidity
        assert_eq!(classify(1.0, 5_000.0, None, 50.0), None);
    }

    #[test]
    fn fixed_tiers_ignore_balance() {
        let cfg = DexConfig::default();
        assert_eq!(stake_sol(Tier::Microspray, 100.0, &cfg), 0.005);
        assert_eq!(stake_sol(Tier::Microspray, 0.1, &cfg), 0.005);
        assert_eq!(stake_sol(Tier::Lottery, 50.0, &cfg), 0.02);
    }

    #[test]
    fn percent_tiers_scale_and_cap() {
        let cfg = DexConfig::default();
        // 10 SOL × 5% × 0.5 = 0.25
        assert!((stake_sol(Tier::Early, 10.0, &cfg) - 0.25).abs() < 1e-12);
        // 10 SOL × 5% = 0.5
        assert!((stake_sol(Tier::Established, 10.0, &cfg) - 0.5).abs() < 1e-12);
        // giant balance hits the cap
        assert_eq!(stake_sol(Tier::Established, 1_000.0, &cfg), cfg.max_position_sol);
    }

    #[test]
    fn lottery_class_uses_wider_later_trailing() {
        let cfg = DexConfig::default();
        assert_eq!(trailing_params(Tier::Lottery, &cfg), (100.0, 20.0));
        assert_eq!(trailing_params(Tier::Microspray, &cfg), (100.0, 20.0));
        assert_eq!(trailing_params(Tier::Early, &cfg), (50.0, 25.0));
    }
}

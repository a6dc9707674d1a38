//! Paper-execution slippage model.
//!
//! `slippage = base + position_usd / max(liquidity_usd, 1) × multiplier`,
//! capped at 15%. Buys execute above the quoted price, sells below.

use crate::domain::SlippageModel;

pub const SLIPPAGE_CAP: f64 = 0.15;

/// Slippage fraction in [0, 0.15].
pub fn slippage_fraction(model: SlippageModel, position_usd: f64, liquidity_usd: f64) -> f64 {
    let (base, multiplier) = model.params();
    let impact = position_usd.max(0.0) / liquidity_usd.max(1.0) * multiplier;
    (base + impact).min(SLIPPAGE_CAP)
}

/// Execution price for a buy: quoted price inflated by slippage.
pub fn buy_price(model: SlippageModel, quoted: f64, position_usd: f64, liquidity_usd: f64) -> f64 {
    quoted * (1.0 + slippage_fraction(model, position_usd, liquidity_usd))
}

/// Execution price for a sell: quoted price deflated by slippage.
pub fn sell_price(model: SlippageModel, quoted: f64, position_usd: f64, liquidity_usd: f64) -> f64 {
    quoted * (1.0 - slippage_fraction(model, position_usd, liquidity_usd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_parameters() {
        assert_eq!(slippage_fraction(SlippageModel::None, 10_000.0, 10_000.0), 0.0);
        // conservative: 0.005 + 1000/100000 × 2 = 0.025
        let c = slippage_fraction(SlippageModel::Conservative, 1_000.0, 100_000.0);
        assert!((c - 0.025).abs() < 1e-12);
        // realistic: 0.01 + 1000/100000 × 5 = 0.06
        let r = slippage_fraction(SlippageModel::Realistic, 1_000.0, 100_000.0);
        assert!((r - 0.06).abs() < 1e-12);
    }

    #[test]
    fn monotone_in_position_size_and_capped() {
        let liquidity = 50_000.0;
        let mut last = 0.0;
        for size in [0.0, 100.0, 500.0, 1_000.0, 5_000.0, 50_000.0, 500_000.0] {
            let s = slippage_fraction(SlippageModel::Realistic, size, liquidity);
            assert!(s >= last, "slippage must be non-decreasing in size");
            assert!(s <= SLIPPAGE_CAP);
            last = s;
        }
        assert_eq!(
            slippage_fraction(SlippageModel::Realistic, 1_000_000.0, 1_000.0),
            SLIPPAGE_CAP
        );
    }

    #[test]
    fn zero_liquidity_does_not_divide_by_zero() {
        let s = slippage_fraction(SlippageModel::Realistic, 100.0, 0.0);
        assert_eq!(s, SLIPPAGE_CAP);
    }

    #[test]
    fn buy_inflates_sell_deflates() {
        let quoted = 2.0;
        let buy = buy_price(SlippageModel::Realistic, quoted, 1_000.0, 100_000.0);
        let sell = sell_price(SlippageModel::Realistic, quoted, 1_000.0, 100_000.0);
        assert!(buy > quoted);
        assert!(sell < quoted);
        assert!((buy - 2.0 * 1.06).abs() < 1e-12);
        assert!((sell - 2.0 * 0.94).abs() < 1e-12);
    }
}

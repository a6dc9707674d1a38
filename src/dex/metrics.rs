//! Derived trading metrics.
//!
//! Everything here is recomputed from the immutable trade history on read —
//! no running sums are trusted, so the numbers cannot drift from the ledger.

use crate::domain::DexTradeRecord;
use crate::state::AgentState;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct DexMetrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    /// win_rate × avg_win − (1 − win_rate) × |avg_loss|
    pub expectancy: f64,
    /// Σ winning SOL / |Σ losing SOL|
    pub profit_factor: f64,
    /// mean(pnl_pct) / stdev(pnl_pct)
    pub sharpe: f64,
    pub total_pnl_sol: f64,
    // echoed state counters
    pub max_consecutive_losses: u32,
    pub current_loss_streak: u32,
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration_ms: i64,
}

/// Compute metrics from the trade history plus the state's streak counters.
/// Depends on nothing else — in particular, not on the clock.
pub fn calculate(state: &AgentState) -> DexMetrics {
    let history = &state.dex_trade_history;
    let mut metrics = from_history(history);
    metrics.max_consecutive_losses = state.dex_max_consecutive_losses;
    metrics.current_loss_streak = state.dex_current_loss_streak;
    metrics.max_drawdown_pct = state.dex_max_drawdown_pct;
    metrics.max_drawdown_duration_ms = state.dex_max_drawdown_duration_ms;
    metrics
}

fn from_history(history: &[DexTradeRecord]) -> DexMetrics {
    let total = history.len();
    if total == 0 {
        return DexMetrics::default();
    }

    let wins: Vec<&DexTradeRecord> = history.iter().filter(|t| t.pnl_sol > 0.0).collect();
    let losses: Vec<&DexTradeRecord> = history.iter().filter(|t| t.pnl_sol < 0.0).collect();

    let win_rate = wins.len() as f64 / total as f64;
    let avg_win_pct = if wins.is_empty() {
        0.0
    } else {
        wins.iter().map(|t| t.pnl_pct).sum::<f64>() / wins.len() as f64
    };
    let avg_loss_pct = if losses.is_empty() {
        0.0
    } else {
        losses.iter().map(|t| t.pnl_pct).sum::<f64>() / losses.len() as f64
    };
    let expectancy = win_rate * avg_win_pct - (1.0 - win_rate) * avg_loss_pct.abs();

    let gross_win: f64 = wins.iter().map(|t| t.pnl_sol).sum();
    let gross_loss: f64 = losses.iter().map(|t| t.pnl_sol).sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_win / gross_loss
    } else if gross_win > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let returns: Vec<f64> = history.iter().map(|t| t.pnl_pct).collect();
    let mean = returns.iter().sum::<f64>() / total as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / total as f64;
    let std_dev = variance.sqrt();
    let sharpe = if std_dev > 1e-12 { mean / std_dev } else { 0.0 };

    DexMetrics {
        total_trades: total,
        wins: wins.len(),
        losses: losses.len(),
        win_rate,
        avg_win_pct,
        avg_loss_pct,
        expectancy,
        profit_factor,
        sharpe,
        total_pnl_sol: history.iter().map(|t| t.pnl_sol).sum(),
        max_consecutive_losses: 0,
        current_loss_streak: 0,
        max_drawdown_pct: 0.0,
        max_drawdown_duration_ms: 0,
    }
}

//! Loss streaks, realized-equity drawdown and the portfolio drawdown halt.
//!
//! Streak and drawdown counters are pure functions of the trade history:
//! replaying every trade through `update_streak_and_drawdown` on a fresh
//! state reproduces them exactly.

use crate::domain::DexTradeRecord;
use crate::state::AgentState;
use chrono::{DateTime, Utc};

/// Update loss streak and realized-equity drawdown after a closed trade.
/// Must run after `dex_realized_pnl_sol` has absorbed the trade.
pub fn update_streak_and_drawdown(state: &mut AgentState, trade: &DexTradeRecord) {
    if trade.pnl_sol < 0.0 {
        state.dex_current_loss_streak += 1;
        state.dex_max_consecutive_losses = state
            .dex_max_consecutive_losses
            .max(state.dex_current_loss_streak);
    } else {
        state.dex_current_loss_streak = 0;
    }

    // realized-equity proxy: starting balance plus all realized pnl
    let equity = state.config.dex.starting_balance_sol + state.dex_realized_pnl_sol;

    if equity > state.dex_peak_balance {
        // new peak: close any open drawdown spell
        if let Some(start) = state.dex_drawdown_start_time.take() {
            let duration_ms = (trade.exit_time - start).num_milliseconds();
            state.dex_max_drawdown_duration_ms =
                state.dex_max_drawdown_duration_ms.max(duration_ms);
        }
        state.dex_peak_balance = equity;
    } else if equity < state.dex_peak_balance {
        if state.dex_drawdown_start_time.is_none() {
            state.dex_drawdown_start_time = Some(trade.exit_time);
        }
        if state.dex_peak_balance > 0.0 {
            let dd_pct = (state.dex_peak_balance - equity) / state.dex_peak_balance * 100.0;
            state.dex_max_drawdown_pct = state.dex_max_drawdown_pct.max(dd_pct);
        }
    }
}

/// Track the mark-to-market portfolio peak and the drawdown halt flag.
/// The pause arms at `max_drawdown_pct` below the peak and clears only at a
/// new high (`total_value >= peak_value`). Returns Some(event) when the flag
/// flipped.
pub fn update_portfolio_peak(
    state: &mut AgentState,
    total_value_sol: f64,
    _now: DateTime<Utc>,
) -> Option<&'static str> {
    if !total_value_sol.is_finite() || total_value_sol < 0.0 {
        return None;
    }

    if total_value_sol >= state.dex_peak_value {
        state.dex_peak_value = total_value_sol;
        if state.dex_drawdown_paused {
            state.dex_drawdown_paused = false;
            return Some("drawdown_pause_cleared");
        }
        return None;
    }

    let drawdown_pct =
        (state.dex_peak_value - total_value_sol) / state.dex_peak_value * 100.0;
    if drawdown_pct >= state.config.dex.max_drawdown_pct && !state.dex_drawdown_paused {
        state.dex_drawdown_paused = true;
        return Some("drawdown_pause_armed");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExitReason;

    fn trade(pnl_sol: f64, exit_time: DateTime<Utc>) -> DexTradeRecord {
        DexTradeRecord {
            symbol: "T".to_string(),
            token_address: "addr".to_string(),
            entry_price: 1.0,
            exit_price: 1.0,
            entry_stake_sol: 0.1,
            entry_time: exit_time - chrono::Duration::minutes(30),
            exit_time,
            pnl_pct: pnl_sol * 100.0,
            pnl_sol,
            exit_reason: if pnl_sol < 0.0 {
                ExitReason::StopLoss
            } else {
                ExitReason::TakeProfit
            },
        }
    }

    fn apply(state: &mut AgentState, trades: &[DexTradeRecord]) {
        for t in trades {
            state.dex_realized_pnl_sol += t.pnl_sol;
            update_streak_and_drawdown(state, t);
        }
    }

    #[test]
    fn streaks_reset_on_wins() {
        let mut s = AgentState::new();
        let now = Utc::now();
        let trades = vec![
            trade(-0.1, now),
            trade(-0.1, now),
            trade(0.5, now),
            trade(-0.1, now),
            trade(-0.1, now),
            trade(-0.1, now),
        ];
        apply(&mut s, &trades);
        assert_eq!(s.dex_current_loss_streak, 3);
        assert_eq!(s.dex_max_consecutive_losses, 3);
    }

    #[test]
    fn replaying_history_reproduces_counters() {
        let now = Utc::now();
        let trades: Vec<DexTradeRecord> = vec![
            trade(0.4, now),
            trade(-0.6, now + chrono::Duration::hours(1)),
            trade(-0.5, now + chrono::Duration::hours(2)),
            trade(1.2, now + chrono::Duration::hours(3)),
            trade(-0.2, now + chrono::Duration::hours(4)),
        ];

        let mut live = AgentState::new();
        apply(&mut live, &trades);

        let mut replay = AgentState::new();
        apply(&mut replay, &trades);

        assert_eq!(live.dex_max_consecutive_losses, replay.dex_max_consecutive_losses);
        assert_eq!(live.dex_current_loss_streak, replay.dex_current_loss_streak);
        assert!((live.dex_max_drawdown_pct - replay.dex_max_drawdown_pct).abs() < 1e-12);
        assert_eq!(
            live.dex_max_drawdown_duration_ms,
            replay.dex_max_drawdown_duration_ms
        );
    }

    #[test]
    fn drawdown_pct_measured_from_peak() {
        let mut s = AgentState::new(); // starting balance 10
        let now = Utc::now();
        // peak moves to 12, then equity falls to 9: dd = 25%
        apply(
            &mut s,
            &[
                trade(2.0, now),
                trade(-3.0, now + chrono::Duration::hours(1)),
            ],
        );
        assert!((s.dex_max_drawdown_pct - 25.0).abs() < 1e-9);
        assert!(s.dex_drawdown_start_time.is_some());
    }

    #[test]
    fn drawdown_duration_closes_at_new_peak() {
        let mut s = AgentState::new();
        let t0 = Utc::now();
        apply(
            &mut s,
            &[
                trade(-1.0, t0),
                trade(0.5, t0 + chrono::Duration::hours(5)),
                trade(1.0, t0 + chrono::Duration::hours(8)),
            ],
        );
        // recovery above the 10.0 start peak happens at t0+8h
        assert_eq!(s.dex_drawdown_start_time, None);
        assert_eq!(s.dex_max_drawdown_duration_ms, 8 * 3_600_000);
    }

    #[test]
    fn portfolio_pause_arms_and_clears_at_new_high() {
        let mut s = AgentState::new();
        let now = Utc::now();
        assert_eq!(update_portfolio_peak(&mut s, 12.0, now), None);
        assert_eq!(s.dex_peak_value, 12.0);

        // 30% down: below the 35% halt threshold
        assert_eq!(update_portfolio_peak(&mut s, 8.4, now), None);
        assert!(!s.dex_drawdown_paused);

        // 40% down: halt
        assert_eq!(
            update_portfolio_peak(&mut s, 7.2, now),
            Some("drawdown_pause_armed")
        );
        assert!(s.dex_drawdown_paused);

        // partial recovery does not clear
        assert_eq!(update_portfolio_peak(&mut s, 11.0, now), None);
        assert!(s.dex_drawdown_paused);

        // new high clears
        assert_eq!(
            update_portfolio_peak(&mut s, 12.0, now),
            Some("drawdown_pause_cleared")
        );
        assert!(!s.dex_drawdown_paused);
    }
}

//! Circuit breaker: global DEX entry pause after repeated stop-losses.
//!
//! N stop-losses inside a rolling window arm the breaker for a fixed pause.
//! Two early-clear paths exist, both gated on a minimum cooldown so one
//! bounce cannot immediately re-open the floodgates.

use crate::domain::StopLossEvent;
use crate::state::AgentState;
use chrono::{DateTime, Duration, Utc};

/// Record a stop-loss and arm the breaker when the rolling window fills.
/// Returns true when this event tripped the breaker.
pub fn record_stop_loss(state: &mut AgentState, symbol: &str, now: DateTime<Utc>) -> bool {
    let cfg = state.config.dex.clone();
    let window = Duration::milliseconds((cfg.circuit_breaker_window_hours * 3_600_000.0) as i64);

    state.dex_recent_stop_losses.push(StopLossEvent {
        timestamp: now,
        symbol: symbol.to_string(),
    });
    state
        .dex_recent_stop_losses
        .retain(|e| now - e.timestamp <= window);

    if state.dex_recent_stop_losses.len() >= cfg.circuit_breaker_losses
        && state.dex_circuit_breaker_until.is_none()
    {
        let until =
            now + Duration::milliseconds((cfg.circuit_breaker_pause_hours * 3_600_000.0) as i64);
        state.dex_circuit_breaker_until = Some(until);
        return true;
    }
    false
}

/// Whether the breaker currently blocks entries. Clears on time expiry.
pub fn is_active(state: &mut AgentState, now: DateTime<Utc>) -> bool {
    match state.dex_circuit_breaker_until {
        Some(until) if now >= until => {
            state.dex_circuit_breaker_until = None;
            state.dex_recent_stop_losses.clear();
            false
        }
        Some(_) => true,
        None => false,
    }
}

/// Early-clear evaluation, run once per cycle before entries.
///
/// Requires `breaker_min_cooldown_minutes` elapsed since the breaker was
/// armed, then clears when (a) any open position has recovered to positive
/// P&L at its latest mark, or (b) the scan produced a not-held signal with
/// momentum at or above the re-entry minimum. Returns the reason when
/// cleared.
pub fn try_early_clear(
    state: &mut AgentState,
    scan_best_unheld_momentum: Option<f64>,
    any_position_in_profit: bool,
    now: DateTime<Utc>,
) -> Option<&'static str> {
    let until = state.dex_circuit_breaker_until?;
    let cfg = &state.config.dex;

    let armed_at =
        until - Duration::milliseconds((cfg.circuit_breaker_pause_hours * 3_600_000.0) as i64);
    if now - armed_at < Duration::minutes(cfg.breaker_min_cooldown_minutes) {
        return None;
    }

    let reason = if any_position_in_profit {
        Some("position_recovered")
    } else if scan_best_unheld_momentum.map_or(false, |m| m >= cfg.reentry_min_momentum) {
        Some("fresh_momentum")
    } else {
        None
    };

    if reason.is_some() {
        state.dex_circuit_breaker_until = None;
        state.dex_recent_stop_losses.clear();
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AgentState {
        AgentState::new()
    }

    #[test]
    fn three_losses_in_window_arm_the_breaker() {
        let mut s = state();
        let now = Utc::now();
        assert!(!record_stop_loss(&mut s, "A", now - Duration::hours(3)));
        assert!(!record_stop_loss(&mut s, "B", now - Duration::hours(1)));
        assert!(record_stop_loss(&mut s, "C", now));
        let until = s.dex_circuit_breaker_until.unwrap();
        assert_eq!(until, now + Duration::hours(1));
        assert!(is_active(&mut s, now));
    }

    #[test]
    fn losses_outside_window_do_not_count() {
        let mut s = state();
        let now = Utc::now();
        record_stop_loss(&mut s, "A", now - Duration::hours(30));
        record_stop_loss(&mut s, "B", now - Duration::hours(28));
        assert!(!record_stop_loss(&mut s, "C", now));
        assert!(s.dex_circuit_breaker_until.is_none());
    }

    #[test]
    fn expires_on_wall_clock() {
        let mut s = state();
        let now = Utc::now();
        for sym in ["A", "B", "C"] {
            record_stop_loss(&mut s, sym, now);
        }
        assert!(is_active(&mut s, now + Duration::minutes(59)));
        assert!(!is_active(&mut s, now + Duration::minutes(61)));
        assert!(s.dex_recent_stop_losses.is_empty());
    }

    #[test]
    fn early_clear_requires_min_cooldown() {
        let mut s = state();
        let now = Utc::now();
        for sym in ["A", "B", "C"] {
            record_stop_loss(&mut s, sym, now);
        }
        // 10 minutes in: strong signal, still blocked
        assert!(try_early_clear(&mut s, Some(75.0), false, now + Duration::minutes(10)).is_none());
        assert!(s.dex_circuit_breaker_until.is_some());
        // 35 minutes in: fresh momentum clears
        let reason = try_early_clear(&mut s, Some(75.0), false, now + Duration::minutes(35));
        assert_eq!(reason, Some("fresh_momentum"));
        assert!(s.dex_circuit_breaker_until.is_none());
    }

    #[test]
    fn early_clear_on_recovered_position() {
        let mut s = state();
        let now = Utc::now();
        for sym in ["A", "B", "C"] {
            record_stop_loss(&mut s, sym, now);
        }
        let reason = try_early_clear(&mut s, None, true, now + Duration::minutes(40));
        assert_eq!(reason, Some("position_recovered"));
    }

    #[test]
    fn weak_momentum_does_not_clear() {
        let mut s = state();
        let now = Utc::now();
        for sym in ["A", "B", "C"] {
            record_stop_loss(&mut s, sym, now);
        }
        assert!(try_early_clear(&mut s, Some(65.0), false, now + Duration::minutes(40)).is_none());
        assert!(s.dex_circuit_breaker_until.is_some());
    }
}

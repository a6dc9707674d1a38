//! Stop-loss cooldowns.
//!
//! After a stop-loss or trailing-stop exit a token is locked out until one
//! of three conditions re-opens it: the price recovers past the exit, fresh
//! momentum arrives after a minimum wait, or the fallback wall clock runs
//! out.

use crate::config::DexConfig;
use crate::domain::StopLossCooldown;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Build the cooldown entry recorded at exit time.
pub fn arm(exit_price: f64, exit_time: DateTime<Utc>, cfg: &DexConfig) -> StopLossCooldown {
    StopLossCooldown {
        exit_price,
        exit_time,
        fallback_expiry: exit_time
            + Duration::milliseconds((cfg.stop_loss_cooldown_hours * 3_600_000.0) as i64),
    }
}

/// Re-entry predicate. Allowed iff any of:
/// (a) price recovered: `current >= exit × (1 + reentry_recovery_pct)`
/// (b) fresh momentum: `momentum >= reentry_min_momentum` and the minimum
///     wait since exit has passed
/// (c) the fallback expiry has passed
pub fn reentry_allowed(
    cooldown: &StopLossCooldown,
    current_price: f64,
    momentum_score: f64,
    now: DateTime<Utc>,
    cfg: &DexConfig,
) -> bool {
    if current_price >= cooldown.exit_price * (1.0 + cfg.reentry_recovery_pct) {
        return true;
    }
    let elapsed = now - cooldown.exit_time;
    if momentum_score >= cfg.reentry_min_momentum
        && elapsed >= Duration::minutes(cfg.reentry_min_elapsed_minutes)
    {
        return true;
    }
    now >= cooldown.fallback_expiry
}

/// Drop entries past the retention window. Runs once per tick.
pub fn prune(
    cooldowns: &mut HashMap<String, StopLossCooldown>,
    now: DateTime<Utc>,
    cfg: &DexConfig,
) -> usize {
    let cutoff = now - Duration::milliseconds((cfg.cooldown_retention_hours * 3_600_000.0) as i64);
    let before = cooldowns.len();
    cooldowns.retain(|_, c| c.exit_time > cutoff);
    before - cooldowns.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DexConfig {
        DexConfig::default()
    }

    fn cooldown_at(exit_price: f64, exit_time: DateTime<Utc>) -> StopLossCooldown {
        arm(exit_price, exit_time, &cfg())
    }

    #[test]
    fn price_recovery_reopens_immediately() {
        let now = Utc::now();
        let cd = cooldown_at(0.50, now);
        // 15% recovery over 0.50 is 0.575
        assert!(reentry_allowed(&cd, 0.575, 0.0, now, &cfg()));
        assert!(reentry_allowed(&cd, 0.60, 0.0, now, &cfg()));
        assert!(!reentry_allowed(&cd, 0.57, 0.0, now, &cfg()));
    }

    #[test]
    fn momentum_path_needs_minimum_wait() {
        let exit = Utc::now();
        let cd = cooldown_at(0.50, exit);
        let c = cfg();
        // strong momentum but only 2 minutes since exit
        assert!(!reentry_allowed(&cd, 0.52, 90.0, exit + Duration::minutes(2), &c));
        // weak momentum after the wait
        assert!(!reentry_allowed(&cd, 0.52, 62.0, exit + Duration::minutes(6), &c));
        // strong momentum after the wait
        assert!(reentry_allowed(&cd, 0.52, 72.0, exit + Duration::minutes(6), &c));
    }

    #[test]
    fn fallback_expiry_reopens_unconditionally() {
        let exit = Utc::now();
        let cd = cooldown_at(0.50, exit);
        let c = cfg();
        let just_before = cd.fallback_expiry - Duration::seconds(1);
        let just_after = cd.fallback_expiry + Duration::seconds(1);
        assert!(!reentry_allowed(&cd, 0.10, 0.0, just_before, &c));
        assert!(reentry_allowed(&cd, 0.10, 0.0, just_after, &c));
    }

    #[test]
    fn reentry_truth_table() {
        let exit = Utc::now();
        let cd = cooldown_at(1.0, exit);
        let c = cfg();
        let recovery = 1.0 * (1.0 + c.reentry_recovery_pct);
        let waited = exit + Duration::minutes(c.reentry_min_elapsed_minutes);
        let expired = cd.fallback_expiry;

        for &(price, momentum, at, expected) in &[
            (recovery, 0.0, exit, true),              // (a) alone
            (recovery - 1e-9, c.reentry_min_momentum, waited, true), // (b) alone
            (0.5, 0.0, expired, true),                // (c) alone
            (recovery - 1e-9, c.reentry_min_momentum - 1.0, waited, false),
            (recovery - 1e-9, c.reentry_min_momentum, exit, false),
            (0.5, 0.0, exit, false),
        ] {
            assert_eq!(
                reentry_allowed(&cd, price, momentum, at, &c),
                expected,
                "price={price} momentum={momentum}"
            );
        }
    }

    #[test]
    fn prune_drops_old_entries_only() {
        let now = Utc::now();
        let mut map = HashMap::new();
        map.insert("fresh".to_string(), cooldown_at(1.0, now - Duration::hours(2)));
        map.insert("stale".to_string(), cooldown_at(1.0, now - Duration::hours(30)));
        let dropped = prune(&mut map, now, &cfg());
        assert_eq!(dropped, 1);
        assert!(map.contains_key("fresh"));
        assert!(!map.contains_key("stale"));
    }
}

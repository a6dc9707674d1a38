//! Position staleness scoring.
//!
//! A held symbol accumulates points for age, dead-money price action and
//! collapsing social interest. At 70 points (or a full max-hold with nothing
//! to show for it) the position is stale and gets recycled.

use crate::config::StalenessConfig;
use crate::domain::StalenessAnalysis;
use chrono::{DateTime, Utc};

/// Score a held position. `volume_ratio` is current social volume over the
/// volume at entry; `None` when there is no history to compare.
pub fn score_position(
    symbol: &str,
    hold_hours: f64,
    pl_pct: f64,
    volume_ratio: Option<f64>,
    cfg: &StalenessConfig,
    now: DateTime<Utc>,
) -> StalenessAnalysis {
    let mut score: f64 = 0.0;
    let mut reasons = Vec::new();
    let hold_days = hold_hours / 24.0;

    // Time: linear ramp from mid-hold to +40 at max-hold
    if hold_days >= cfg.mid_hold_days {
        let span = (cfg.max_hold_days - cfg.mid_hold_days).max(f64::EPSILON);
        let ramp = ((hold_days - cfg.mid_hold_days) / span).clamp(0.0, 1.0);
        let points = ramp * 40.0;
        if points > 0.0 {
            score += points;
            reasons.push(format!("held {hold_days:.1}d (+{points:.0})"));
        }
    }

    // Price action
    if pl_pct < 0.0 {
        let points = (pl_pct.abs() * 3.0).min(30.0);
        score += points;
        reasons.push(format!("underwater {pl_pct:.1}% (+{points:.0})"));
    }
    if pl_pct < cfg.mid_min_gain_pct && hold_days >= cfg.mid_hold_days {
        score += 15.0;
        reasons.push(format!("flat past mid-hold (+15)"));
    }

    // Social decay
    if let Some(ratio) = volume_ratio {
        if ratio <= cfg.social_volume_decay {
            score += 30.0;
            reasons.push(format!("social volume at {:.0}% of entry (+30)", ratio * 100.0));
        } else if ratio <= 0.5 {
            score += 15.0;
            reasons.push(format!("social volume at {:.0}% of entry (+15)", ratio * 100.0));
        }
    }

    let max_hold_exhausted = hold_days >= cfg.max_hold_days && pl_pct < cfg.min_gain_pct;
    if max_hold_exhausted {
        reasons.push(format!(
            "max hold reached with {pl_pct:.1}% < {:.1}% target",
            cfg.min_gain_pct
        ));
    }
    let is_stale = score >= 70.0 || max_hold_exhausted;

    StalenessAnalysis {
        symbol: symbol.to_string(),
        score,
        is_stale,
        reasons,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StalenessConfig {
        StalenessConfig::default()
    }

    #[test]
    fn fresh_winner_is_not_stale() {
        let a = score_position("AAPL", 30.0, 8.0, Some(1.2), &cfg(), Utc::now());
        assert!(!a.is_stale);
        assert_eq!(a.score, 0.0);
    }

    #[test]
    fn time_ramp_is_linear_between_mid_and_max() {
        let c = cfg(); // mid 3d, max 7d
        let at_mid = score_position("X", 3.0 * 24.0, 5.0, None, &c, Utc::now());
        assert_eq!(at_mid.score, 0.0);
        // halfway: 5 days -> +20
        let halfway = score_position("X", 5.0 * 24.0, 5.0, None, &c, Utc::now());
        assert!((halfway.score - 20.0).abs() < 1e-9);
        let at_max = score_position("X", 7.0 * 24.0, 5.1, None, &c, Utc::now());
        assert!((at_max.score - 40.0).abs() < 1e-9);
        assert!(!at_max.is_stale); // gain target met, score below 70
    }

    #[test]
    fn deep_underwater_caps_at_30_points() {
        let shallow = score_position("X", 2.0, -5.0, None, &cfg(), Utc::now());
        assert!((shallow.score - 15.0).abs() < 1e-9);
        let deep = score_position("X", 2.0, -40.0, None, &cfg(), Utc::now());
        assert!((deep.score - 30.0).abs() < 1e-9);
    }

    #[test]
    fn combined_decay_crosses_the_threshold() {
        // 6 days held (+30 time), -6% (+18 price, +15 flat past mid), dead social (+30)
        let a = score_position("X", 6.0 * 24.0, -6.0, Some(0.2), &cfg(), Utc::now());
        assert!(a.score >= 70.0, "score {}", a.score);
        assert!(a.is_stale);
        assert!(a.reasons.len() >= 3);
    }

    #[test]
    fn max_hold_without_gain_is_stale_regardless_of_score() {
        let a = score_position("X", 7.1 * 24.0, 2.0, Some(1.0), &cfg(), Utc::now());
        assert!(a.is_stale);
        // gain above target at max hold is not stale by this rule
        let winner = score_position("X", 7.1 * 24.0, 12.0, Some(1.0), &cfg(), Utc::now());
        assert!(!winner.is_stale);
    }

    #[test]
    fn partial_social_decay_scores_half() {
        let half = score_position("X", 2.0, 5.0, Some(0.45), &cfg(), Utc::now());
        assert!((half.score - 15.0).abs() < 1e-9);
        let dead = score_position("X", 2.0, 5.0, Some(0.25), &cfg(), Utc::now());
        assert!((dead.score - 30.0).abs() < 1e-9);
    }
}

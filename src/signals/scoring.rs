//! Signal weighting.
//!
//! `weighted = raw × source_weight × time_decay × engagement × flair`.
//! All multipliers are pure functions of the signal's metadata.

use crate::domain::SignalSource;
use chrono::{DateTime, Utc};

/// Per-source trust weight.
pub fn source_weight(source: SignalSource, detail: &str) -> f64 {
    match source {
        SignalSource::FinTwit => 0.95,
        SignalSource::Twitter => 0.9,
        SignalSource::StockTwits => 0.85,
        SignalSource::CryptoMarket => 0.8,
        SignalSource::Reddit => match detail {
            "investing" => 0.85,
            "stocks" => 0.8,
            "options" => 0.75,
            "wallstreetbets" => 0.6,
            _ => 0.7,
        },
    }
}

/// Exponential decay with the configured half-life, clamped to [0.2, 1.0].
pub fn time_decay(timestamp: DateTime<Utc>, now: DateTime<Utc>, half_life_minutes: f64) -> f64 {
    if half_life_minutes <= 0.0 {
        return 1.0;
    }
    let age_minutes = (now - timestamp).num_seconds().max(0) as f64 / 60.0;
    let decay = 0.5_f64.powf(age_minutes / half_life_minutes);
    decay.clamp(0.2, 1.0)
}

fn upvote_multiplier(upvotes: u32) -> f64 {
    match upvotes {
        0..=9 => 0.8,
        10..=49 => 0.9,
        50..=99 => 1.0,
        100..=499 => 1.1,
        500..=999 => 1.25,
        _ => 1.4,
    }
}

fn comment_multiplier(comments: u32) -> f64 {
    match comments {
        0..=4 => 0.8,
        5..=19 => 0.9,
        20..=49 => 1.0,
        50..=199 => 1.1,
        200..=499 => 1.25,
        _ => 1.4,
    }
}

/// Average of the bucketed upvote and comment multipliers. Missing metadata
/// is neutral.
pub fn engagement_multiplier(upvotes: Option<u32>, comments: Option<u32>) -> f64 {
    match (upvotes, comments) {
        (Some(u), Some(c)) => (upvote_multiplier(u) + comment_multiplier(c)) / 2.0,
        (Some(u), None) => upvote_multiplier(u),
        (None, Some(c)) => comment_multiplier(c),
        (None, None) => 1.0,
    }
}

/// Flair lookup: DD is the only flair that amplifies.
pub fn flair_multiplier(flair: Option<&str>) -> f64 {
    match flair {
        Some("DD") => 1.5,
        Some("News") => 1.2,
        Some("Discussion") => 1.0,
        Some("YOLO") => 0.6,
        Some("Gain") | Some("Loss") => 0.6,
        Some("Meme") | Some("Shitpost") => 0.5,
        _ => 1.0,
    }
}

/// Full weighting pipeline; returns (weighted_sentiment, freshness).
pub fn weight_sentiment(
    raw_sentiment: f64,
    source: SignalSource,
    detail: &str,
    timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
    half_life_minutes: f64,
    upvotes: Option<u32>,
    comments: Option<u32>,
    flair: Option<&str>,
) -> (f64, f64) {
    let freshness = time_decay(timestamp, now, half_life_minutes);
    let weighted = raw_sentiment.clamp(-1.0, 1.0)
        * source_weight(source, detail)
        * freshness
        * engagement_multiplier(upvotes, comments)
        * flair_multiplier(flair);
    (weighted, freshness)
}

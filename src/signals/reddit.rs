//! Reddit gatherer.
//!
//! Pulls the day's top posts for each configured subreddit, extracts ticker
//! mentions from titles and bodies, scores raw sentiment with a small
//! finance lexicon, and weights with engagement and flair.

use crate::domain::{Signal, SignalSource};
use crate::error::Result;
use crate::signals::{scoring, tickers};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const POSTS_PER_SUB: u32 = 25;

const BULLISH_WORDS: &[&str] = &[
    "moon", "rocket", "breakout", "undervalued", "bullish", "calls", "buy", "buying",
    "squeeze", "rip", "printing", "beat", "upgrade", "rally", "gains", "winner",
];

const BEARISH_WORDS: &[&str] = &[
    "crash", "dump", "overvalued", "bearish", "puts", "sell", "selling", "drill",
    "bagholding", "miss", "downgrade", "tank", "bankrupt", "fraud", "rug", "loser",
];

/// Lexicon sentiment in [-1, 1]; 0 when no scored words appear.
pub fn lexicon_sentiment(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let mut bull = 0i32;
    let mut bear = 0i32;
    for word in lower.split(|c: char| !c.is_ascii_alphabetic()) {
        if BULLISH_WORDS.contains(&word) {
            bull += 1;
        } else if BEARISH_WORDS.contains(&word) {
            bear += 1;
        }
    }
    let total = bull + bear;
    if total == 0 {
        return 0.0;
    }
    (bull - bear) as f64 / total as f64
}

#[derive(Debug, Deserialize)]
struct ListingWire {
    data: ListingDataWire,
}

#[derive(Debug, Deserialize)]
struct ListingDataWire {
    children: Vec<PostContainerWire>,
}

#[derive(Debug, Deserialize)]
struct PostContainerWire {
    data: PostWire,
}

#[derive(Debug, Deserialize)]
struct PostWire {
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    ups: u32,
    #[serde(default)]
    num_comments: u32,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    created_utc: f64,
}

pub struct RedditGatherer {
    http: reqwest::Client,
}

impl RedditGatherer {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("gambit-agent/0.4 (signal research)")
            .build()?;
        Ok(Self { http })
    }

    /// One pass over every configured subreddit. A failing subreddit is
    /// logged and skipped; mentions of the same ticker across posts and
    /// subs merge into a single volume-weighted signal.
    pub async fn gather(
        &self,
        subreddits: &[String],
        user_blacklist: &[String],
        half_life_minutes: f64,
    ) -> Result<Vec<Signal>> {
        let now = Utc::now();
        // symbol -> accumulated (signal, weight_sum)
        let mut merged: HashMap<String, (Signal, f64)> = HashMap::new();

        for sub in subreddits {
            let url = format!(
                "https://www.reddit.com/r/{sub}/top.json?t=day&limit={POSTS_PER_SUB}"
            );
            let listing: ListingWire = match self
                .http
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(response) => match response.json().await {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("reddit r/{sub} parse failed: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!("reddit r/{sub} fetch failed: {e}");
                    continue;
                }
            };

            for container in listing.data.children {
                let post = container.data;
                let text = format!("{} {}", post.title, post.selftext);
                let found = tickers::extract_tickers(&text, user_blacklist);
                if found.is_empty() {
                    continue;
                }
                let raw = lexicon_sentiment(&text);
                if raw == 0.0 {
                    continue;
                }
                let posted = DateTime::<Utc>::from_timestamp(post.created_utc as i64, 0)
                    .unwrap_or(now);
                let flair = post.link_flair_text.as_deref();
                let (weighted, freshness) = scoring::weight_sentiment(
                    raw,
                    SignalSource::Reddit,
                    sub,
                    posted,
                    now,
                    half_life_minutes,
                    Some(post.ups),
                    Some(post.num_comments),
                    flair,
                );

                for symbol in found {
                    let entry = merged.entry(symbol.clone()).or_insert_with(|| {
                        (
                            Signal {
                                symbol,
                                source: SignalSource::Reddit,
                                source_detail: sub.clone(),
                                raw_sentiment: 0.0,
                                sentiment: 0.0,
                                volume: 0,
                                freshness,
                                timestamp: posted,
                                upvotes: Some(0),
                                comments: Some(0),
                                flair: post.link_flair_text.clone(),
                                subreddits: Some(Vec::new()),
                                is_crypto: None,
                                momentum: None,
                                price: None,
                            },
                            0.0,
                        )
                    });
                    let (signal, weight_sum) = entry;
                    // weight each post's contribution by engagement
                    let post_weight = 1.0 + (post.ups as f64).ln_1p() / 10.0;
                    signal.raw_sentiment = (signal.raw_sentiment * *weight_sum
                        + raw * post_weight)
                        / (*weight_sum + post_weight);
                    signal.sentiment = (signal.sentiment * *weight_sum
                        + weighted * post_weight)
                        / (*weight_sum + post_weight);
                    *weight_sum += post_weight;
                    signal.volume += 1;
                    signal.upvotes = Some(signal.upvotes.unwrap_or(0) + post.ups);
                    signal.comments = Some(signal.comments.unwrap_or(0) + post.num_comments);
                    signal.timestamp = signal.timestamp.max(posted);
                    if let Some(subs) = &mut signal.subreddits {
                        if !subs.contains(sub) {
                            subs.push(sub.clone());
                        }
                    }
                }
            }
        }

        let signals: Vec<Signal> = merged.into_values().map(|(s, _)| s).collect();
        debug!("reddit gather: {} merged signals", signals.len());
        Ok(signals)
    }
}

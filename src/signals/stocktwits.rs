//! StockTwits gatherer.
//!
//! Trending symbols plus the message stream for each, reduced to one signal
//! per symbol from the Bullish/Bearish labels users attach. The public API
//! sits behind a CDN that intermittently answers 403, so every call retries
//! with exponential backoff (max 3 attempts).

use crate::domain::{Signal, SignalSource};
use crate::error::{GambitError, Result};
use crate::signals::scoring;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const TRENDING_URL: &str = "https://api.stocktwits.com/api/2/trending/symbols.json";
const MAX_ATTEMPTS: u32 = 3;
const MAX_SYMBOLS: usize = 10;

#[derive(Debug, Deserialize)]
struct TrendingWire {
    symbols: Vec<TrendingSymbolWire>,
}

#[derive(Debug, Deserialize)]
struct TrendingSymbolWire {
    symbol: String,
    #[serde(default)]
    watchlist_count: u32,
}

#[derive(Debug, Deserialize)]
struct StreamWire {
    messages: Vec<MessageWire>,
}

#[derive(Debug, Deserialize)]
struct MessageWire {
    #[serde(default)]
    entities: Option<EntitiesWire>,
}

#[derive(Debug, Deserialize)]
struct EntitiesWire {
    #[serde(default)]
    sentiment: Option<SentimentWire>,
}

#[derive(Debug, Deserialize)]
struct SentimentWire {
    #[serde(default)]
    basic: Option<String>,
}

pub struct StockTwitsGatherer {
    http: reqwest::Client,
}

impl StockTwitsGatherer {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; gambit-agent)")
            .build()?;
        Ok(Self { http })
    }

    async fn get_with_backoff<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut delay = Duration::from_millis(500);
        for attempt in 1..=MAX_ATTEMPTS {
            match self.http.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt == MAX_ATTEMPTS {
                        return Err(GambitError::Provider(format!(
                            "stocktwits {status} after {attempt} attempts: {url}"
                        )));
                    }
                    debug!("stocktwits {status} on attempt {attempt}, backing off");
                }
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    debug!("stocktwits error on attempt {attempt}: {e}");
                }
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        unreachable!("loop returns on final attempt")
    }

    /// Trending symbols with their crowd sentiment. Individual stream
    /// failures drop that symbol, not the whole gather.
    pub async fn gather(&self, half_life_minutes: f64) -> Result<Vec<Signal>> {
        let trending: TrendingWire = self.get_with_backoff(TRENDING_URL).await?;
        let now = Utc::now();
        let mut signals = Vec::new();

        for item in trending.symbols.into_iter().take(MAX_SYMBOLS) {
            let url = format!(
                "https://api.stocktwits.com/api/2/streams/symbol/{}.json",
                item.symbol
            );
            let stream: StreamWire = match self.get_with_backoff(&url).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("stocktwits stream for {} failed: {e}", item.symbol);
                    continue;
                }
            };

            let mut bullish = 0u32;
            let mut bearish = 0u32;
            for message in &stream.messages {
                match message
                    .entities
                    .as_ref()
                    .and_then(|e| e.sentiment.as_ref())
                    .and_then(|s| s.basic.as_deref())
                {
                    Some("Bullish") => bullish += 1,
                    Some("Bearish") => bearish += 1,
                    _ => {}
                }
            }
            let labeled = bullish + bearish;
            if labeled == 0 {
                continue;
            }
            let raw = (bullish as f64 - bearish as f64) / labeled as f64;

            let (weighted, freshness) = scoring::weight_sentiment(
                raw,
                SignalSource::StockTwits,
                "trending",
                now,
                now,
                half_life_minutes,
                None,
                None,
                None,
            );
            signals.push(Signal {
                symbol: item.symbol,
                source: SignalSource::StockTwits,
                source_detail: "trending".to_string(),
                raw_sentiment: raw,
                sentiment: weighted,
                volume: stream.messages.len() as u32 + item.watchlist_count / 1000,
                freshness,
                timestamp: now,
                upvotes: None,
                comments: None,
                flair: None,
                subreddits: None,
                is_crypto: None,
                momentum: None,
                price: None,
            });
        }

        debug!("stocktwits gather: {} signals", signals.len());
        Ok(signals)
    }
}

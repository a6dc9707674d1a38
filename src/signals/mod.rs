//! Signal acquisition: multi-source polling normalized into weighted
//! signals.
//!
//! Each gatherer is isolated — a failing source logs and contributes an
//! empty batch, never aborting the pass. The merged result feeds
//! `AgentState::merge_signals` (24 h TTL, 200-entry cap).

pub mod reddit;
pub mod scoring;
pub mod stocktwits;
pub mod tickers;
pub mod twitter;

use crate::adapters::broker::Broker;
use crate::config::SignalConfig;
use crate::domain::{Signal, SignalSource};
use crate::error::Result;
use chrono::Utc;
use tracing::warn;

/// Crypto pairs polled for market-momentum signals.
const CRYPTO_WATCHLIST: &[&str] = &["BTC/USD", "ETH/USD", "SOL/USD", "DOGE/USD", "AVAX/USD"];

pub struct SignalGatherers {
    pub stocktwits: stocktwits::StockTwitsGatherer,
    pub reddit: reddit::RedditGatherer,
    pub validator: tickers::TickerValidator,
}

impl SignalGatherers {
    pub fn new() -> Result<Self> {
        Ok(Self {
            stocktwits: stocktwits::StockTwitsGatherer::new()?,
            reddit: reddit::RedditGatherer::new()?,
            validator: tickers::TickerValidator::new()?,
        })
    }

    /// One full acquisition pass. Sources run concurrently; each failure is
    /// logged and yields an empty batch. Reddit-extracted tickers are
    /// validated (SEC list, then broker asset lookup) before they enter the
    /// cache.
    pub async fn gather_all(
        &self,
        cfg: &SignalConfig,
        broker: &dyn Broker,
        crypto_enabled: bool,
    ) -> Vec<Signal> {
        let (stocktwits_result, reddit_result, crypto_result) = tokio::join!(
            self.stocktwits.gather(cfg.decay_half_life_minutes),
            self.reddit.gather(
                &cfg.subreddits,
                &cfg.ticker_blacklist,
                cfg.decay_half_life_minutes
            ),
            gather_crypto(broker, crypto_enabled),
        );

        let mut signals = Vec::new();
        match stocktwits_result {
            Ok(batch) => signals.extend(batch),
            Err(e) => warn!("stocktwits gather failed: {e}"),
        }
        match reddit_result {
            Ok(batch) => {
                for signal in batch {
                    if self.validator.is_valid(&signal.symbol, broker).await {
                        signals.push(signal);
                    }
                }
            }
            Err(e) => warn!("reddit gather failed: {e}"),
        }
        match crypto_result {
            Ok(batch) => signals.extend(batch),
            Err(e) => warn!("crypto gather failed: {e}"),
        }
        signals
    }
}

/// Market-derived crypto signals: daily momentum mapped onto [-1, 1].
async fn gather_crypto(broker: &dyn Broker, enabled: bool) -> Result<Vec<Signal>> {
    if !enabled {
        return Ok(Vec::new());
    }
    let now = Utc::now();
    let mut signals = Vec::new();
    for pair in CRYPTO_WATCHLIST {
        let snapshot = match broker.get_crypto_snapshot(pair).await {
            Ok(s) => s,
            Err(e) => {
                warn!("crypto snapshot {pair} failed: {e}");
                continue;
            }
        };
        let Some(prev_close) = snapshot.prev_close.filter(|p| *p > 0.0) else {
            continue;
        };
        let change_pct = (snapshot.price - prev_close) / prev_close * 100.0;
        let raw = (change_pct / 10.0).clamp(-1.0, 1.0);
        let (weighted, freshness) = scoring::weight_sentiment(
            raw,
            SignalSource::CryptoMarket,
            "daily",
            now,
            now,
            120.0,
            None,
            None,
            None,
        );
        signals.push(Signal {
            symbol: pair.to_string(),
            source: SignalSource::CryptoMarket,
            source_detail: "daily".to_string(),
            raw_sentiment: raw,
            sentiment: weighted,
            volume: 1,
            freshness,
            timestamp: now,
            upvotes: None,
            comments: None,
            flair: None,
            subreddits: None,
            is_crypto: Some(true),
            momentum: Some(change_pct),
            price: Some(snapshot.price),
        });
    }
    Ok(signals)
}

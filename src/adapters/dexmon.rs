//! DEX data providers: momentum token scanner, OHLCV chart analyzer, and the
//! SOL/USD price cache.
//!
//! The scanner walks DexScreener boosted-token listings, keeps Solana pairs,
//! scores them, and classifies each into an entry tier. The chart analyzer
//! pulls GeckoTerminal OHLCV for a token's top pool. Both sit behind the
//! `DexProvider` trait so the paper engine can be driven without a network.

use crate::dex::tiers;
use crate::domain::Tier;
use crate::error::{GambitError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";
const GECKOTERMINAL_BASE: &str = "https://api.geckoterminal.com/api/v2";
const SOL_PRICE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";

// ============================================================================
// Candidate model
// ============================================================================

/// One scan result: a token that passed a tier's filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCandidate {
    pub token_address: String,
    pub symbol: String,
    pub name: String,
    pub url: String,
    pub price_usd: f64,
    pub price_change_5m: Option<f64>,
    pub price_change_6h: f64,
    pub price_change_24h: f64,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub age_hours: f64,
    /// 0-100
    pub momentum_score: f64,
    /// 0-100
    pub legitimacy_score: f64,
    pub tier: Tier,
    pub dex_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartCandle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartIndicators {
    pub trend: String,
    pub volume_profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPattern {
    pub pattern: String,
    pub signal: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartAnalysis {
    pub timeframe: String,
    pub candles: Vec<ChartCandle>,
    /// 0-100
    pub entry_score: f64,
    pub recommendation: String,
    pub indicators: ChartIndicators,
    pub patterns: Vec<ChartPattern>,
}

#[async_trait]
pub trait DexProvider: Send + Sync {
    /// Scan for momentum tokens across all tiers.
    async fn find_momentum_tokens(&self) -> Result<Vec<TokenCandidate>>;

    /// OHLCV analysis for a token; Ok(None) when no chart data exists.
    async fn analyze_chart(&self, token_address: &str, age_hours: f64)
        -> Result<Option<ChartAnalysis>>;
}

// ============================================================================
// Scoring
// ============================================================================

/// Momentum score in [0, 100] from short-horizon price action and turnover.
/// Recent movement dominates: 5-minute change is worth as much as the whole
/// 6-hour window.
pub fn momentum_score(
    price_change_5m: Option<f64>,
    price_change_1h: Option<f64>,
    price_change_6h: f64,
    volume_24h: f64,
    liquidity: f64,
) -> f64 {
    let mut score = 0.0;

    // 5m burst: 0-30
    if let Some(m5) = price_change_5m {
        score += (m5 / 50.0 * 30.0).clamp(0.0, 30.0);
    }
    // 1h trend: 0-25
    if let Some(h1) = price_change_1h {
        score += (h1 / 100.0 * 25.0).clamp(0.0, 25.0);
    }
    // 6h trend: 0-25
    score += (price_change_6h / 200.0 * 25.0).clamp(0.0, 25.0);
    // turnover: volume relative to liquidity, 0-20
    if liquidity > 0.0 {
        score += (volume_24h / liquidity / 5.0 * 20.0).clamp(0.0, 20.0);
    }

    score.clamp(0.0, 100.0)
}

/// Legitimacy score in [0, 100]: depth, age and sane turnover reduce the odds
/// of a honeypot or wash-traded pair.
pub fn legitimacy_score(liquidity: f64, age_hours: f64, volume_24h: f64) -> f64 {
    let mut score = 0.0;

    score += (liquidity / 100_000.0 * 40.0).clamp(0.0, 40.0);
    score += (age_hours / 72.0 * 30.0).clamp(0.0, 30.0);
    // turnover between 0.1x and 20x liquidity reads as organic
    if liquidity > 0.0 {
        let turnover = volume_24h / liquidity;
        if (0.1..=20.0).contains(&turnover) {
            score += 30.0;
        } else if turnover > 0.0 {
            score += 10.0;
        }
    }

    score.clamp(0.0, 100.0)
}

// ============================================================================
// DexScreener scanner
// ============================================================================

#[derive(Debug, Deserialize)]
struct BoostWire {
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "tokenAddress")]
    token_address: String,
}

#[derive(Debug, Deserialize)]
struct PairWire {
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "dexId")]
    dex_id: String,
    url: Option<String>,
    #[serde(rename = "baseToken")]
    base_token: BaseTokenWire,
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    price_change: Option<PriceChangeWire>,
    volume: Option<VolumeWire>,
    liquidity: Option<LiquidityWire>,
    #[serde(rename = "pairCreatedAt")]
    pair_created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BaseTokenWire {
    address: String,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceChangeWire {
    m5: Option<f64>,
    h1: Option<f64>,
    h6: Option<f64>,
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VolumeWire {
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LiquidityWire {
    usd: Option<f64>,
}

pub struct DexScreenerProvider {
    http: Client,
}

impl DexScreenerProvider {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http })
    }

    fn candidate_from_pair(&self, pair: &PairWire, now_ms: i64) -> Option<TokenCandidate> {
        if pair.chain_id != "solana" {
            return None;
        }
        let price_usd: f64 = pair.price_usd.as_deref()?.parse().ok()?;
        if price_usd <= 0.0 {
            return None;
        }
        let liquidity = pair.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
        let volume_24h = pair.volume.as_ref().and_then(|v| v.h24).unwrap_or(0.0);
        let created = pair.pair_created_at?;
        let age_hours = (now_ms - created) as f64 / 3_600_000.0;
        if age_hours <= 0.0 {
            return None;
        }

        let change = pair.price_change.as_ref();
        let m5 = change.and_then(|c| c.m5);
        let h1 = change.and_then(|c| c.h1);
        let h6 = change.and_then(|c| c.h6).unwrap_or(0.0);
        let h24 = change.and_then(|c| c.h24).unwrap_or(0.0);

        let momentum = momentum_score(m5, h1, h6, volume_24h, liquidity);
        let legitimacy = legitimacy_score(liquidity, age_hours, volume_24h);
        let tier = tiers::classify(age_hours, liquidity, m5, legitimacy)?;

        Some(TokenCandidate {
            token_address: pair.base_token.address.clone(),
            symbol: pair
                .base_token
                .symbol
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            name: pair.base_token.name.clone().unwrap_or_default(),
            url: pair.url.clone().unwrap_or_default(),
            price_usd,
            price_change_5m: m5,
            price_change_6h: h6,
            price_change_24h: h24,
            volume_24h,
            liquidity,
            age_hours,
            momentum_score: momentum,
            legitimacy_score: legitimacy,
            tier,
            dex_id: pair.dex_id.clone(),
        })
    }
}

#[async_trait]
impl DexProvider for DexScreenerProvider {
    async fn find_momentum_tokens(&self) -> Result<Vec<TokenCandidate>> {
        let boosts: Vec<BoostWire> = self
            .http
            .get(format!("{DEXSCREENER_BASE}/token-boosts/latest/v1"))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GambitError::Provider(format!("dexscreener boosts: {e}")))?
            .json()
            .await?;

        let addresses: Vec<String> = boosts
            .into_iter()
            .filter(|b| b.chain_id == "solana")
            .map(|b| b.token_address)
            .take(60)
            .collect();
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut candidates = Vec::new();
        // token endpoint accepts up to 30 comma-separated addresses
        for chunk in addresses.chunks(30) {
            let url = format!(
                "{DEXSCREENER_BASE}/latest/dex/tokens/{}",
                chunk.join(",")
            );
            #[derive(Debug, Deserialize)]
            struct TokensWire {
                pairs: Option<Vec<PairWire>>,
            }
            let wire: TokensWire = self
                .http
                .get(&url)
                .send()
                .await?
                .error_for_status()
                .map_err(|e| GambitError::Provider(format!("dexscreener tokens: {e}")))?
                .json()
                .await?;
            for pair in wire.pairs.unwrap_or_default() {
                if let Some(c) = self.candidate_from_pair(&pair, now_ms) {
                    candidates.push(c);
                }
            }
        }

        // one candidate per token: keep the deepest pair
        candidates.sort_by(|a, b| {
            a.token_address
                .cmp(&b.token_address)
                .then(b.liquidity.partial_cmp(&a.liquidity).unwrap_or(std::cmp::Ordering::Equal))
        });
        candidates.dedup_by(|a, b| a.token_address == b.token_address);
        candidates.sort_by(|a, b| {
            b.momentum_score
                .partial_cmp(&a.momentum_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        debug!("dex scan produced {} candidates", candidates.len());
        Ok(candidates)
    }

    async fn analyze_chart(
        &self,
        token_address: &str,
        age_hours: f64,
    ) -> Result<Option<ChartAnalysis>> {
        #[derive(Debug, Deserialize)]
        struct PoolsWire {
            data: Vec<PoolWire>,
        }
        #[derive(Debug, Deserialize)]
        struct PoolWire {
            id: String,
        }
        let pools: PoolsWire = self
            .http
            .get(format!(
                "{GECKOTERMINAL_BASE}/networks/solana/tokens/{token_address}/pools?page=1"
            ))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GambitError::Provider(format!("geckoterminal pools: {e}")))?
            .json()
            .await?;

        let Some(pool) = pools.data.first() else {
            return Ok(None);
        };
        let pool_address = pool.id.trim_start_matches("solana_").to_string();

        // younger tokens need a finer timeframe to have any candles at all
        let timeframe = if age_hours < 6.0 {
            "minute"
        } else if age_hours < 72.0 {
            "hour"
        } else {
            "day"
        };

        #[derive(Debug, Deserialize)]
        struct OhlcvWire {
            data: OhlcvDataWire,
        }
        #[derive(Debug, Deserialize)]
        struct OhlcvDataWire {
            attributes: OhlcvAttrsWire,
        }
        #[derive(Debug, Deserialize)]
        struct OhlcvAttrsWire {
            ohlcv_list: Vec<[f64; 6]>,
        }
        let ohlcv: OhlcvWire = self
            .http
            .get(format!(
                "{GECKOTERMINAL_BASE}/networks/solana/pools/{pool_address}/ohlcv/{timeframe}?limit=50"
            ))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GambitError::Provider(format!("geckoterminal ohlcv: {e}")))?
            .json()
            .await?;

        // oldest-first for analysis
        let mut rows = ohlcv.data.attributes.ohlcv_list;
        rows.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap_or(std::cmp::Ordering::Equal));
        let candles: Vec<ChartCandle> = rows
            .into_iter()
            .map(|row| ChartCandle {
                timestamp: row[0] as i64,
                open: row[1],
                high: row[2],
                low: row[3],
                close: row[4],
                volume: row[5],
            })
            .collect();

        if candles.len() < 5 {
            return Ok(None);
        }
        Ok(Some(analyze_candles(timeframe, candles)))
    }
}

/// Score a candle series for entry quality. Pure so it can be tested without
/// a provider.
pub fn analyze_candles(timeframe: &str, candles: Vec<ChartCandle>) -> ChartAnalysis {
    let n = candles.len();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let recent = &closes[n.saturating_sub(10)..];
    let first = recent.first().copied().unwrap_or(0.0);
    let last = recent.last().copied().unwrap_or(0.0);
    let trend_pct = if first > 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };

    let half = n / 2;
    let early_vol: f64 = volumes[..half].iter().sum::<f64>() / half.max(1) as f64;
    let late_vol: f64 =
        volumes[half..].iter().sum::<f64>() / (n - half).max(1) as f64;
    let volume_rising = late_vol > early_vol * 1.2;

    let mut score: f64 = 50.0;
    let trend = if trend_pct > 5.0 {
        score += 20.0;
        "uptrend"
    } else if trend_pct < -5.0 {
        score -= 25.0;
        "downtrend"
    } else {
        "sideways"
    };
    let volume_profile = if volume_rising {
        score += 15.0;
        "rising"
    } else {
        "falling"
    };

    let mut patterns = Vec::new();
    // higher lows across the last three swing points
    if n >= 9 {
        let lows: Vec<f64> = candles[n - 9..].chunks(3).map(|c| {
            c.iter().map(|x| x.low).fold(f64::INFINITY, f64::min)
        }).collect();
        if lows.windows(2).all(|w| w[1] > w[0]) {
            score += 10.0;
            patterns.push(ChartPattern {
                pattern: "higher_lows".to_string(),
                signal: "bullish".to_string(),
                description: "three consecutive higher swing lows".to_string(),
            });
        }
    }
    // blow-off: last close far above the series mean on falling volume
    let mean = closes.iter().sum::<f64>() / n as f64;
    if mean > 0.0 && last > mean * 1.8 && !volume_rising {
        score -= 20.0;
        patterns.push(ChartPattern {
            pattern: "extended".to_string(),
            signal: "bearish".to_string(),
            description: "price far above mean with fading volume".to_string(),
        });
    }

    let score = score.clamp(0.0, 100.0);
    let recommendation = if score >= 60.0 {
        "enter"
    } else if score >= 40.0 {
        "neutral"
    } else {
        "avoid"
    };

    ChartAnalysis {
        timeframe: timeframe.to_string(),
        candles,
        entry_score: score,
        recommendation: recommendation.to_string(),
        indicators: ChartIndicators {
            trend: trend.to_string(),
            volume_profile: volume_profile.to_string(),
        },
        patterns,
    }
}

// ============================================================================
// SOL/USD price cache
// ============================================================================

/// Process-wide SOL price cache: 5-minute TTL, stale value reused on fetch
/// failure, configured fallback when nothing was ever fetched.
pub struct SolPriceCache {
    http: Client,
    cached: RwLock<Option<(f64, Instant)>>,
    ttl: Duration,
}

impl SolPriceCache {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            cached: RwLock::new(None),
            ttl: Duration::from_secs(300),
        })
    }

    pub async fn get(&self, fallback: f64) -> f64 {
        if let Some((price, at)) = *self.cached.read().await {
            if at.elapsed() < self.ttl {
                return price;
            }
        }

        match self.fetch().await {
            Ok(price) => {
                *self.cached.write().await = Some((price, Instant::now()));
                price
            }
            Err(e) => {
                warn!("SOL price fetch failed: {e}");
                match *self.cached.read().await {
                    Some((stale, _)) => stale,
                    None => fallback,
                }
            }
        }
    }

    async fn fetch(&self) -> Result<f64> {
        #[derive(Debug, Deserialize)]
        struct PriceWire {
            solana: CurrencyWire,
        }
        #[derive(Debug, Deserialize)]
        struct CurrencyWire {
            usd: f64,
        }
        let wire: PriceWire = self
            .http
            .get(SOL_PRICE_URL)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| GambitError::Provider(format!("sol price: {e}")))?
            .json()
            .await?;
        if wire.solana.usd <= 0.0 {
            return Err(GambitError::Provider("sol price <= 0".to_string()));
        }
        Ok(wire.solana.usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_score_rewards_recent_action() {
        let hot = momentum_score(Some(60.0), Some(80.0), 150.0, 500_000.0, 50_000.0);
        let cold = momentum_score(Some(1.0), Some(2.0), 5.0, 10_000.0, 50_000.0);
        assert!(hot > 80.0);
        assert!(cold < 15.0);
        assert!(hot <= 100.0);
    }

    #[test]
    fn momentum_score_ignores_negative_changes() {
        let dumping = momentum_score(Some(-40.0), Some(-60.0), -80.0, 100_000.0, 50_000.0);
        assert!(dumping <= 20.0); // only turnover can contribute
    }

    #[test]
    fn legitimacy_prefers_deep_aged_pools() {
        let solid = legitimacy_score(120_000.0, 96.0, 300_000.0);
        let fresh = legitimacy_score(8_000.0, 0.5, 400_000.0);
        assert!(solid > 90.0);
        assert!(fresh < 30.0);
    }

    #[test]
    fn candle_analysis_flags_uptrend() {
        let candles: Vec<ChartCandle> = (0..20)
            .map(|i| {
                let base = 1.0 + i as f64 * 0.02;
                ChartCandle {
                    timestamp: i,
                    open: base,
                    high: base * 1.01,
                    low: base * 0.99,
                    close: base * 1.005,
                    volume: 100.0 + i as f64 * 20.0,
                }
            })
            .collect();
        let analysis = analyze_candles("minute", candles);
        assert_eq!(analysis.indicators.trend, "uptrend");
        assert_eq!(analysis.indicators.volume_profile, "rising");
        assert!(analysis.entry_score >= 60.0);
        assert_eq!(analysis.recommendation, "enter");
    }

    #[test]
    fn candle_analysis_penalizes_downtrend() {
        let candles: Vec<ChartCandle> = (0..20)
            .map(|i| {
                let base = 2.0 - i as f64 * 0.05;
                ChartCandle {
                    timestamp: i,
                    open: base,
                    high: base * 1.01,
                    low: base * 0.99,
                    close: base,
                    volume: 500.0 - i as f64 * 20.0,
                }
            })
            .collect();
        let analysis = analyze_candles("minute", candles);
        assert_eq!(analysis.indicators.trend, "downtrend");
        assert!(analysis.entry_score < 40.0);
        assert_eq!(analysis.recommendation, "avoid");
    }
}

//! Ticker extraction and validation.
//!
//! Extraction is deliberately conservative: `$SYM` is always a candidate,
//! a bare 2-5 letter uppercase token only counts when a trading keyword
//! follows it, and both forms pass a blacklist of English words and trading
//! slang before anything downstream sees them.

use crate::adapters::broker::Broker;
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Caps words that show up in finance posts but are never the ticker being
/// discussed.
const STATIC_BLACKLIST: &[&str] = &[
    // English
    "THE", "AND", "FOR", "ALL", "ARE", "YOU", "NOT", "BUT", "CAN", "GET", "GOT", "HAS",
    "HAD", "HIS", "HER", "ITS", "NEW", "NOW", "OLD", "ONE", "OUT", "OWN", "SEE", "WAY",
    "WHO", "WHY", "BIG", "DAY", "TOO", "USE", "THIS", "THAT", "WITH", "FROM", "HAVE",
    "WILL", "WHAT", "WHEN", "JUST", "ONLY", "EVER", "EVEN", "INTO", "OVER", "MORE",
    "MOST", "MUCH", "BEEN", "BEST", "GOOD", "HUGE", "LONG", "NEXT", "OPEN", "REAL",
    "SOME", "SOON", "SURE", "THAN", "THEM", "THEN", "THEY", "VERY", "WEEK", "YEAR",
    "HOLD", "STILL", "GOING", "TODAY",
    // Trading slang & tickers-that-aren't
    "YOLO", "FOMO", "HODL", "MOON", "PUMP", "DUMP", "BULL", "BEAR", "CALL", "PUTS",
    "BUY", "SELL", "STOP", "LOSS", "GAIN", "WSB", "IMO", "TLDR", "EPS", "ETF", "IPO",
    "CEO", "CFO", "SEC", "FED", "GDP", "USA", "USD", "ATH", "ATL", "EOD", "AH", "PM",
    "DD", "PT", "ITM", "OTM", "IV", "PE", "API", "FAQ", "PSA", "EDIT", "NYSE", "OTC",
];

/// Words that qualify a bare uppercase token as a ticker mention.
const TRADING_KEYWORDS: &[&str] = &[
    "calls", "puts", "shares", "stock", "options", "buy", "bought", "sell", "sold",
    "long", "short", "earnings", "price", "dip", "rally", "breakout", "squeeze",
    "moon", "chart", "volume", "support", "resistance",
];

/// Extract candidate tickers from free text. `user_blacklist` entries are
/// uppercase symbols.
pub fn extract_tickers(text: &str, user_blacklist: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    let words: Vec<&str> = text.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        let (candidate, dollar_prefixed) = if let Some(stripped) = word.strip_prefix('$') {
            (stripped, true)
        } else {
            (*word, false)
        };
        let candidate = candidate.trim_matches(|c: char| !c.is_ascii_alphabetic());
        if candidate.len() < 2
            || candidate.len() > 5
            || !candidate.chars().all(|c| c.is_ascii_uppercase())
        {
            continue;
        }
        if STATIC_BLACKLIST.contains(&candidate)
            || user_blacklist.iter().any(|b| b == candidate)
        {
            continue;
        }
        // bare symbols need a trading keyword right after them
        if !dollar_prefixed {
            let followed = words
                .get(i + 1)
                .map(|next| {
                    let next = next
                        .trim_matches(|c: char| !c.is_ascii_alphabetic())
                        .to_ascii_lowercase();
                    TRADING_KEYWORDS.contains(&next.as_str())
                })
                .unwrap_or(false);
            if !followed {
                continue;
            }
        }
        if seen.insert(candidate.to_string()) {
            found.push(candidate.to_string());
        }
    }
    found
}

// ============================================================================
// Validation
// ============================================================================

const SEC_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SEC_TTL: Duration = Duration::from_secs(24 * 3600);

/// Process-wide validator: SEC-known tickers refreshed on a 24 h TTL, with a
/// per-process broker asset-lookup cache for everything the SEC list misses
/// (crypto pairs, new listings).
pub struct TickerValidator {
    http: reqwest::Client,
    sec: RwLock<Option<(HashSet<String>, Instant)>>,
    broker_cache: RwLock<HashMap<String, bool>>,
}

impl TickerValidator {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("gambit-agent research@localhost")
            .build()?;
        Ok(Self {
            http,
            sec: RwLock::new(None),
            broker_cache: RwLock::new(HashMap::new()),
        })
    }

    async fn sec_tickers(&self) -> Option<HashSet<String>> {
        {
            let cached = self.sec.read().await;
            if let Some((set, at)) = cached.as_ref() {
                if at.elapsed() < SEC_TTL {
                    return Some(set.clone());
                }
            }
        }

        match self.fetch_sec().await {
            Ok(set) => {
                debug!("SEC ticker list refreshed: {} symbols", set.len());
                *self.sec.write().await = Some((set.clone(), Instant::now()));
                Some(set)
            }
            Err(e) => {
                warn!("SEC ticker fetch failed: {e}");
                // keep serving the expired copy rather than nothing
                self.sec.read().await.as_ref().map(|(s, _)| s.clone())
            }
        }
    }

    async fn fetch_sec(&self) -> Result<HashSet<String>> {
        #[derive(serde::Deserialize)]
        struct Row {
            ticker: String,
        }
        let rows: HashMap<String, Row> = self
            .http
            .get(SEC_TICKERS_URL)
            .send()
            .await?
            .error_for_status()
            .map_err(crate::error::GambitError::Http)?
            .json()
            .await?;
        Ok(rows.into_values().map(|r| r.ticker.to_uppercase()).collect())
    }

    /// A ticker is valid when the SEC knows it, or when the broker reports a
    /// tradable asset for it. Broker lookups are cached for the process
    /// lifetime.
    pub async fn is_valid(&self, symbol: &str, broker: &dyn Broker) -> bool {
        if let Some(sec) = self.sec_tickers().await {
            if sec.contains(symbol) {
                return true;
            }
        }

        if let Some(&known) = self.broker_cache.read().await.get(symbol) {
            return known;
        }

        let valid = match broker.get_asset(symbol).await {
            Ok(asset) => asset.tradable,
            Err(_) => false,
        };
        self.broker_cache
            .write()
            .await
            .insert(symbol.to_string(), valid);
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_prefix_always_counts() {
        let tickers = extract_tickers("loading up on $NVDA before earnings", &[]);
        assert_eq!(tickers, vec!["NVDA"]);
    }

    #[test]
    fn bare_symbol_requires_trading_keyword() {
        assert!(extract_tickers("AMD is a company", &[]).is_empty());
        assert_eq!(extract_tickers("AMD calls printing", &[]), vec!["AMD"]);
        assert_eq!(extract_tickers("TSLA stock is wild", &[]), vec!["TSLA"]);
    }

    #[test]
    fn blacklists_filter_slang_and_user_entries() {
        assert!(extract_tickers("$YOLO $MOON THE DD", &[]).is_empty());
        let user = vec!["GME".to_string()];
        assert!(extract_tickers("$GME to the moon", &user).is_empty());
    }

    #[test]
    fn length_and_case_bounds() {
        assert!(extract_tickers("$A $TOOLONG $aapl", &[]).is_empty());
        assert_eq!(extract_tickers("$AB ok, $ABCDE too", &[]), vec!["AB", "ABCDE"]);
    }

    #[test]
    fn dedupes_and_strips_punctuation() {
        let tickers = extract_tickers("$PLTR, $PLTR! and buying PLTR shares", &[]);
        assert_eq!(tickers, vec!["PLTR"]);
    }
}

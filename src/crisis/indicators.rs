//! Macro indicator fetchers.
//!
//! Yahoo Finance chart endpoints for market prices, FRED for treasury/Fed
//! series. Every fetch returns `Option` — a failed or missing source scores
//! zero, it never aborts the crisis check. All fetches run concurrently.

use crate::domain::CrisisIndicators;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const YAHOO_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const FRED_BASE: &str = "https://api.stlouisfed.org/fred/series/observations";

pub struct IndicatorClient {
    http: reqwest::Client,
    fred_api_key: String,
}

#[derive(Debug, Deserialize)]
struct YahooWire {
    chart: YahooChartWire,
}

#[derive(Debug, Deserialize)]
struct YahooChartWire {
    result: Option<Vec<YahooResultWire>>,
}

#[derive(Debug, Deserialize)]
struct YahooResultWire {
    indicators: YahooIndicatorsWire,
}

#[derive(Debug, Deserialize)]
struct YahooIndicatorsWire {
    quote: Vec<YahooQuoteWire>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteWire {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct FredWire {
    observations: Vec<FredObservationWire>,
}

#[derive(Debug, Deserialize)]
struct FredObservationWire {
    value: String,
}

/// (first, last) valid closes over the requested range.
#[derive(Debug, Clone, Copy)]
struct Series {
    first: f64,
    last: f64,
}

impl Series {
    fn change_pct(&self) -> f64 {
        if self.first == 0.0 {
            return 0.0;
        }
        (self.last - self.first) / self.first * 100.0
    }
}

impl IndicatorClient {
    pub fn new(fred_api_key: String) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; gambit-agent)")
            .build()?;
        Ok(Self { http, fred_api_key })
    }

    async fn yahoo(&self, symbol: &str, range: &str) -> Option<Series> {
        let url = format!("{YAHOO_BASE}/{symbol}?interval=1d&range={range}");
        let wire: YahooWire = match self.http.get(&url).send().await {
            Ok(r) if r.status().is_success() => r.json().await.ok()?,
            Ok(r) => {
                warn!("yahoo {symbol}: HTTP {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("yahoo {symbol}: {e}");
                return None;
            }
        };
        let closes: Vec<f64> = wire
            .chart
            .result?
            .into_iter()
            .next()?
            .indicators
            .quote
            .into_iter()
            .next()?
            .close?
            .into_iter()
            .flatten()
            .collect();
        let first = *closes.first()?;
        let last = *closes.last()?;
        Some(Series { first, last })
    }

    async fn fred_latest(&self, series_id: &str) -> Option<Series> {
        if self.fred_api_key.is_empty() {
            return None;
        }
        let url = format!(
            "{FRED_BASE}?series_id={series_id}&api_key={}&file_type=json&sort_order=desc&limit=10",
            self.fred_api_key
        );
        let wire: FredWire = match self.http.get(&url).send().await {
            Ok(r) if r.status().is_success() => r.json().await.ok()?,
            Ok(r) => {
                warn!("fred {series_id}: HTTP {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("fred {series_id}: {e}");
                return None;
            }
        };
        // newest first; "." marks missing observations
        let values: Vec<f64> = wire
            .observations
            .iter()
            .filter_map(|o| o.value.parse().ok())
            .collect();
        let last = *values.first()?;
        let first = *values.last()?;
        Some(Series { first, last })
    }

    /// Fetch everything concurrently. `stocks_above_200ma` has no wired
    /// source and stays None.
    pub async fn fetch_all(&self) -> CrisisIndicators {
        let (
            vix,
            btc,
            usdt,
            gold,
            silver,
            hyg,
            tlt,
            dxy,
            usdjpy,
            kre,
            yield_curve,
            ted,
            fed,
        ) = tokio::join!(
            self.yahoo("%5EVIX", "1d"),
            self.yahoo("BTC-USD", "7d"),
            self.yahoo("USDT-USD", "1d"),
            self.yahoo("GC%3DF", "1d"),
            self.yahoo("SI%3DF", "7d"),
            self.yahoo("HYG", "5d"),
            self.yahoo("TLT", "5d"),
            self.yahoo("DX-Y.NYB", "1d"),
            self.yahoo("USDJPY%3DX", "1d"),
            self.yahoo("KRE", "7d"),
            self.fred_latest("T10Y2Y"),
            self.fred_latest("TEDRATE"),
            self.fred_latest("WALCL"),
        );

        // Synthetic HY spread proxy: HYG underperformance vs TLT over 5 days
        // mapped to bps and re-baselined. A stand-in for a real OAS feed.
        let hy_spread = match (hyg, tlt) {
            (Some(h), Some(t)) => {
                let proxy = (t.change_pct() - h.change_pct()) * 50.0;
                Some((300.0 + proxy).max(200.0))
            }
            _ => None,
        };

        let indicators = CrisisIndicators {
            vix: vix.map(|s| s.last),
            hy_spread,
            yc_2y10y: yield_curve.map(|s| s.last),
            ted: ted.map(|s| s.last),
            btc_price: btc.map(|s| s.last),
            btc_weekly_pct: btc.map(|s| s.change_pct()),
            usdt_peg: usdt.map(|s| s.last),
            dxy: dxy.map(|s| s.last),
            usdjpy: usdjpy.map(|s| s.last),
            kre: kre.map(|s| s.last),
            kre_weekly_pct: kre.map(|s| s.change_pct()),
            gold_silver_ratio: match (gold, silver) {
                (Some(g), Some(s)) if s.last > 0.0 => Some(g.last / s.last),
                _ => None,
            },
            silver_weekly_pct: silver.map(|s| s.change_pct()),
            stocks_above_200ma: None,
            fed_balance_sheet: fed.map(|s| s.last),
            fed_change_pct: fed.map(|s| s.change_pct()),
            last_updated: Some(Utc::now()),
        };
        debug!(
            "indicators: vix={:?} hy={:?} btc_w={:?}",
            indicators.vix, indicators.hy_spread, indicators.btc_weekly_pct
        );
        indicators
    }
}

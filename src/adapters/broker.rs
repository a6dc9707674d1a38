//! Broker adapter.
//!
//! The `Broker` trait is the full capability set the trader needs: account,
//! positions, clock, assets, snapshots, order submission and the options
//! surface. The production impl speaks the Alpaca REST API; money fields
//! arrive as JSON strings and are kept as `Decimal` end to end.

use crate::config::BrokerCredentials;
use crate::error::{GambitError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    UsEquity,
    UsOption,
    Crypto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerAccount {
    pub cash: Decimal,
    pub equity: Decimal,
    #[serde(default)]
    pub daytrade_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: Decimal,
    pub market_value: Decimal,
    pub current_price: Decimal,
    pub unrealized_pl: Decimal,
    pub unrealized_plpc: Decimal,
    pub avg_entry_price: Decimal,
    pub asset_class: AssetClass,
}

impl BrokerPosition {
    /// Unrealized P&L as a percentage of cost basis.
    pub fn pl_pct(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        let cost_basis = self.market_value - self.unrealized_pl;
        if cost_basis.is_zero() {
            return 0.0;
        }
        (self.unrealized_pl / cost_basis * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }

    pub fn is_option(&self) -> bool {
        self.asset_class == AssetClass::UsOption
    }

    pub fn is_crypto(&self) -> bool {
        self.asset_class == AssetClass::Crypto
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketClock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    pub tradable: bool,
    #[serde(rename = "class")]
    pub asset_class: AssetClass,
}

/// Latest trade/quote snapshot for a symbol, reduced to what the trader uses.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub symbol: String,
    pub price: f64,
    pub prev_close: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Day,
    Gtc,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn market_notional(symbol: &str, notional: Decimal, side: OrderSide, tif: TimeInForce) -> Self {
        Self {
            symbol: symbol.to_string(),
            notional: Some(notional),
            qty: None,
            side,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: tif,
        }
    }

    pub fn limit_qty(symbol: &str, qty: Decimal, limit_price: Decimal, side: OrderSide) -> Self {
        Self {
            symbol: symbol.to_string(),
            notional: None,
            qty: Some(qty),
            side,
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            time_in_force: TimeInForce::Day,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub underlying_symbol: String,
    pub expiration_date: NaiveDate,
    pub strike_price: Decimal,
    #[serde(rename = "type")]
    pub option_type: OptionType,
}

/// Greeks + quote snapshot for one option contract.
#[derive(Debug, Clone, Default)]
pub struct OptionSnapshot {
    pub delta: Option<f64>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl OptionSnapshot {
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if a > Decimal::ZERO => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }

    /// Bid/ask spread as a fraction of the mid price.
    pub fn spread_frac(&self) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        let (bid, ask) = (self.bid?, self.ask?);
        let mid = self.mid()?;
        if mid <= Decimal::ZERO {
            return None;
        }
        ((ask - bid) / mid).to_f64()
    }
}

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait Broker: Send + Sync {
    async fn get_account(&self) -> Result<BrokerAccount>;
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>>;
    async fn get_clock(&self) -> Result<MarketClock>;
    async fn get_asset(&self, symbol: &str) -> Result<Asset>;
    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot>;
    async fn get_crypto_snapshot(&self, symbol: &str) -> Result<Snapshot>;
    async fn create_order(&self, request: &OrderRequest) -> Result<Order>;
    async fn close_position(&self, symbol: &str) -> Result<Order>;
    async fn get_option_expirations(&self, underlying: &str) -> Result<Vec<NaiveDate>>;
    async fn get_option_chain(
        &self,
        underlying: &str,
        expiration: NaiveDate,
    ) -> Result<Vec<OptionContract>>;
    async fn get_option_snapshot(&self, contract_symbol: &str) -> Result<OptionSnapshot>;
}

// ============================================================================
// Alpaca implementation
// ============================================================================

pub struct AlpacaBroker {
    http: Client,
    base_url: String,
    data_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct StockSnapshotWire {
    #[serde(rename = "latestTrade")]
    latest_trade: Option<TradeWire>,
    #[serde(rename = "prevDailyBar")]
    prev_daily_bar: Option<BarWire>,
}

#[derive(Debug, Deserialize)]
struct TradeWire {
    p: f64,
}

#[derive(Debug, Deserialize)]
struct BarWire {
    c: f64,
}

#[derive(Debug, Deserialize)]
struct CryptoSnapshotsWire {
    snapshots: std::collections::HashMap<String, StockSnapshotWire>,
}

#[derive(Debug, Deserialize)]
struct OptionContractsWire {
    option_contracts: Vec<OptionContract>,
}

#[derive(Debug, Deserialize)]
struct OptionSnapshotWire {
    #[serde(default)]
    greeks: Option<GreeksWire>,
    #[serde(rename = "latestQuote", default)]
    latest_quote: Option<OptionQuoteWire>,
}

#[derive(Debug, Deserialize)]
struct GreeksWire {
    delta: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OptionQuoteWire {
    bp: Option<Decimal>,
    ap: Option<Decimal>,
}

impl AlpacaBroker {
    pub fn new(creds: &BrokerCredentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: creds.base_url.trim_end_matches('/').to_string(),
            data_url: creds.data_url.trim_end_matches('/').to_string(),
            api_key: creds.api_key.clone(),
            api_secret: creds.api_secret.clone(),
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.get(url.clone()).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GambitError::AssetNotFound(url));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GambitError::Broker(format!("{status} on {url}: {text}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Broker for AlpacaBroker {
    async fn get_account(&self) -> Result<BrokerAccount> {
        self.fetch(format!("{}/v2/account", self.base_url)).await
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        self.fetch(format!("{}/v2/positions", self.base_url)).await
    }

    async fn get_clock(&self) -> Result<MarketClock> {
        self.fetch(format!("{}/v2/clock", self.base_url)).await
    }

    async fn get_asset(&self, symbol: &str) -> Result<Asset> {
        self.fetch(format!("{}/v2/assets/{}", self.base_url, symbol))
            .await
    }

    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot> {
        let wire: StockSnapshotWire = self
            .fetch(format!("{}/v2/stocks/{}/snapshot", self.data_url, symbol))
            .await?;
        let price = wire
            .latest_trade
            .map(|t| t.p)
            .ok_or_else(|| GambitError::MarketDataUnavailable(symbol.to_string()))?;
        Ok(Snapshot {
            symbol: symbol.to_string(),
            price,
            prev_close: wire.prev_daily_bar.map(|b| b.c),
        })
    }

    async fn get_crypto_snapshot(&self, symbol: &str) -> Result<Snapshot> {
        let wire: CryptoSnapshotsWire = self
            .fetch(format!(
                "{}/v1beta3/crypto/us/snapshots?symbols={}",
                self.data_url, symbol
            ))
            .await?;
        let snap = wire
            .snapshots
            .get(symbol)
            .ok_or_else(|| GambitError::MarketDataUnavailable(symbol.to_string()))?;
        let price = snap
            .latest_trade
            .as_ref()
            .map(|t| t.p)
            .ok_or_else(|| GambitError::MarketDataUnavailable(symbol.to_string()))?;
        Ok(Snapshot {
            symbol: symbol.to_string(),
            price,
            prev_close: snap.prev_daily_bar.as_ref().map(|b| b.c),
        })
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        let response = self
            .http
            .post(format!("{}/v2/orders", self.base_url))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GambitError::OrderRejected(format!(
                "{} {}: {}",
                request.symbol, status, text
            )));
        }
        let order: Order = response.json().await?;
        debug!("order accepted: {} {} ({})", order.symbol, order.id, order.status);
        Ok(order)
    }

    async fn close_position(&self, symbol: &str) -> Result<Order> {
        let response = self
            .http
            .delete(format!("{}/v2/positions/{}", self.base_url, symbol))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GambitError::OrderRejected(format!(
                "close {symbol} {status}: {text}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn get_option_expirations(&self, underlying: &str) -> Result<Vec<NaiveDate>> {
        let wire: OptionContractsWire = self
            .fetch(format!(
                "{}/v2/options/contracts?underlying_symbols={}&limit=1000",
                self.base_url, underlying
            ))
            .await?;
        let mut dates: Vec<NaiveDate> = wire
            .option_contracts
            .iter()
            .map(|c| c.expiration_date)
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    async fn get_option_chain(
        &self,
        underlying: &str,
        expiration: NaiveDate,
    ) -> Result<Vec<OptionContract>> {
        let wire: OptionContractsWire = self
            .fetch(format!(
                "{}/v2/options/contracts?underlying_symbols={}&expiration_date={}&limit=1000",
                self.base_url, underlying, expiration
            ))
            .await?;
        Ok(wire.option_contracts)
    }

    async fn get_option_snapshot(&self, contract_symbol: &str) -> Result<OptionSnapshot> {
        let wire: OptionSnapshotWire = self
            .fetch(format!(
                "{}/v1beta1/options/snapshots/{}",
                self.data_url, contract_symbol
            ))
            .await?;
        Ok(OptionSnapshot {
            delta: wire.greeks.and_then(|g| g.delta),
            bid: wire.latest_quote.as_ref().and_then(|q| q.bp),
            ask: wire.latest_quote.as_ref().and_then(|q| q.ap),
        })
    }
}

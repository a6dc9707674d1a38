//! Order execution with invariant gates.
//!
//! Every refusal is logged under an `executor.*_blocked` source so the ring
//! buffer explains exactly why an order never reached the broker. Sizing is
//! validated before submission; a rejected order leaves the position store
//! untouched.

use crate::adapters::broker::{
    AssetClass, Broker, OrderRequest, OrderSide, TimeInForce,
};
use crate::config::TraderConfig;
use crate::domain::{LogLevel, PositionEntry, Signal};
use crate::error::Result;
use crate::state::AgentState;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Buy size: `min(cash × sizePct × confidence × crisis_mult,
/// max_position_value × crisis_mult)` with sizePct capped at 20%.
pub fn buy_size(cash: Decimal, cfg: &TraderConfig, confidence: f64, crisis_mult: f64) -> Decimal {
    let size_pct = cfg.position_size_pct_of_cash.min(20.0) / 100.0;
    let scale = Decimal::from_f64(size_pct * confidence * crisis_mult).unwrap_or(Decimal::ZERO);
    let by_cash = cash * scale;
    let cap = Decimal::from_f64(cfg.max_position_value * crisis_mult).unwrap_or(Decimal::ZERO);
    by_cash.min(cap)
}

/// Pre-submission invariants. Returns the violated invariant, if any.
pub fn validate_buy(
    symbol: &str,
    cash: Decimal,
    confidence: f64,
    size: Decimal,
    max_position_value: f64,
) -> std::result::Result<(), &'static str> {
    if symbol.trim().is_empty() {
        return Err("empty_symbol");
    }
    if cash <= Decimal::ZERO {
        return Err("no_cash");
    }
    if !(confidence > 0.0 && confidence <= 1.0) {
        return Err("confidence_out_of_range");
    }
    let Some(size_f) = size.to_f64() else {
        return Err("size_not_finite");
    };
    if !size_f.is_finite() {
        return Err("size_not_finite");
    }
    if size <= Decimal::ZERO {
        return Err("size_not_positive");
    }
    if size_f > max_position_value * 1.01 {
        return Err("size_exceeds_cap");
    }
    Ok(())
}

/// PDT rule outcome for a same-day sell on a margin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdtVerdict {
    Allow,
    /// One day-trade away from the flag
    Warn,
    Block,
}

pub fn pdt_verdict(
    is_crypto: bool,
    entered_today: bool,
    equity: Decimal,
    daytrade_count: u32,
    min_equity: f64,
) -> PdtVerdict {
    if is_crypto || !entered_today {
        return PdtVerdict::Allow;
    }
    let min = Decimal::from_f64(min_equity).unwrap_or(Decimal::ZERO);
    if equity >= min {
        return PdtVerdict::Allow;
    }
    if daytrade_count >= 3 {
        PdtVerdict::Block
    } else if daytrade_count == 2 {
        PdtVerdict::Warn
    } else {
        PdtVerdict::Allow
    }
}

/// Submit a notional market buy after the invariant gates. Records the
/// position entry only once the broker accepts the order.
#[allow(clippy::too_many_arguments)]
pub async fn execute_buy(
    state: &mut AgentState,
    broker: &dyn Broker,
    signal: &Signal,
    confidence: f64,
    crisis_mult: f64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let symbol = signal.symbol.clone();
    let is_crypto = signal.is_crypto.unwrap_or(false) || symbol.contains('/');

    if crisis_mult <= 0.0 {
        state.log(
            LogLevel::Warn,
            "executor.buy_blocked",
            format!("{symbol}: CRISIS_MODE_BLOCKING"),
        );
        return Ok(false);
    }

    let account = broker.get_account().await?;
    let cfg = state.config.trader.clone();
    let size = buy_size(account.cash, &cfg, confidence, crisis_mult);
    if let Err(invariant) = validate_buy(
        &symbol,
        account.cash,
        confidence,
        size,
        cfg.max_position_value,
    ) {
        state.log(
            LogLevel::Warn,
            "executor.buy_blocked",
            format!("{symbol}: {invariant}"),
        );
        return Ok(false);
    }

    let tif = if is_crypto {
        TimeInForce::Gtc
    } else {
        // equities must trade on an allowed exchange
        let asset = broker.get_asset(&symbol).await?;
        if !asset.tradable
            || (asset.asset_class == AssetClass::UsEquity
                && !cfg.allowed_exchanges.iter().any(|e| e == &asset.exchange))
        {
            state.log(
                LogLevel::Warn,
                "executor.buy_blocked",
                format!("{symbol}: exchange {} not allowed", asset.exchange),
            );
            return Ok(false);
        }
        TimeInForce::Day
    };

    let size = size.round_dp(2);
    let request = OrderRequest::market_notional(&symbol, size, OrderSide::Buy, tif);
    match broker.create_order(&request).await {
        Ok(order) => {
            let price = signal.price.unwrap_or(0.0);
            state.position_entries.insert(
                symbol.clone(),
                PositionEntry {
                    symbol: symbol.clone(),
                    entry_time: now,
                    entry_price: price,
                    entry_sentiment: signal.sentiment,
                    entry_social_volume: signal.volume,
                    entry_sources: vec![format!(
                        "{}/{}",
                        signal.source.as_str(),
                        signal.source_detail
                    )],
                    entry_reason: reason.to_string(),
                    peak_price: price,
                    peak_sentiment: signal.sentiment,
                },
            );
            state.log(
                LogLevel::Info,
                "executor",
                format!("bought {symbol} ${size} (confidence {confidence:.2}, {})", order.status),
            );
            Ok(true)
        }
        Err(e) => {
            // order rejection leaves the position store untouched
            state.log(LogLevel::Error, "executor", format!("buy {symbol} rejected: {e}"));
            Ok(false)
        }
    }
}

/// Close a position via the broker, honoring the PDT guard, then clear the
/// per-symbol caches.
pub async fn execute_sell(
    state: &mut AgentState,
    broker: &dyn Broker,
    symbol: &str,
    is_crypto: bool,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let entered_today = state
        .position_entries
        .get(symbol)
        .map(|e| e.entry_time.date_naive() == now.date_naive())
        .unwrap_or(false);

    if !is_crypto && entered_today {
        let account = broker.get_account().await?;
        match pdt_verdict(
            is_crypto,
            entered_today,
            account.equity,
            account.daytrade_count,
            state.config.trader.pdt_min_equity,
        ) {
            PdtVerdict::Block => {
                state.log(
                    LogLevel::Warn,
                    "executor.sell_blocked_pdt",
                    format!(
                        "{symbol}: equity {} below PDT floor with {} day trades",
                        account.equity, account.daytrade_count
                    ),
                );
                return Ok(false);
            }
            PdtVerdict::Warn => {
                state.log(
                    LogLevel::Warn,
                    "executor",
                    format!("{symbol}: same-day sell uses the 3rd day trade"),
                );
            }
            PdtVerdict::Allow => {}
        }
    }

    match broker.close_position(symbol).await {
        Ok(order) => {
            state.position_entries.remove(symbol);
            state.social_history.remove(symbol);
            state.staleness_analysis.remove(symbol);
            state.position_research.remove(symbol);
            state.log(
                LogLevel::Info,
                "executor",
                format!("sold {symbol} ({reason}, {})", order.status),
            );
            Ok(true)
        }
        Err(e) => {
            state.log(LogLevel::Error, "executor", format!("sell {symbol} failed: {e}"));
            Ok(false)
        }
    }
}

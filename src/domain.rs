//! Core domain types shared across the agent.
//!
//! Everything here is plain data: serializable, cloneable, and keyed by
//! `symbol` / `token_address` rather than by reference. Closed sets (exit
//! reasons, tiers, crisis levels, verdicts) are enums with exhaustive
//! matches at every use site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Signals
// ============================================================================

/// Where a signal came from. The per-source trust weight lives in
/// `signals::scoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    StockTwits,
    Reddit,
    FinTwit,
    CryptoMarket,
    Twitter,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockTwits => "stocktwits",
            Self::Reddit => "reddit",
            Self::FinTwit => "fintwit",
            Self::CryptoMarket => "crypto_market",
            Self::Twitter => "twitter",
        }
    }
}

/// A weighted social/market signal. Immutable once inserted into the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub source: SignalSource,
    /// e.g. subreddit name, "trending", exchange pair
    pub source_detail: String,
    /// Raw sentiment in [-1, 1] before weighting
    pub raw_sentiment: f64,
    /// raw × source_weight × freshness × engagement × flair
    pub sentiment: f64,
    /// Social volume (mentions / messages) behind this signal
    pub volume: u32,
    /// Time-decay factor in [0.2, 1.0]
    pub freshness: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upvotes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddits: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_crypto: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// One point of social-volume history for a held symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SocialPoint {
    pub timestamp: DateTime<Utc>,
    pub volume: u32,
    pub sentiment: f64,
}

// ============================================================================
// Equity/crypto book-keeping
// ============================================================================

/// Book-keeping row created when the equity/crypto trader buys, destroyed on
/// sell or stale-exit. The broker remains the source of truth for the
/// position itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEntry {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_sentiment: f64,
    pub entry_social_volume: u32,
    pub entry_sources: Vec<String>,
    pub entry_reason: String,
    pub peak_price: f64,
    pub peak_sentiment: f64,
}

// ============================================================================
// DEX paper book
// ============================================================================

/// Entry tier for the DEX momentum engine. Controls scan filters, sizing and
/// trailing-stop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Microspray,
    Breakout,
    Lottery,
    Early,
    Established,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Microspray => "microspray",
            Self::Breakout => "breakout",
            Self::Lottery => "lottery",
            Self::Early => "early",
            Self::Established => "established",
        }
    }

    /// Lottery-class tiers share the late-activating wide trailing stop.
    pub fn is_lottery_class(&self) -> bool {
        matches!(self, Self::Microspray | Self::Breakout | Self::Lottery)
    }

    pub const ALL: [Tier; 5] = [
        Tier::Microspray,
        Tier::Breakout,
        Tier::Lottery,
        Tier::Early,
        Tier::Established,
    ];
}

/// Why a DEX paper position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    LostMomentum,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::TrailingStop => "trailing_stop",
            Self::LostMomentum => "lost_momentum",
            Self::Manual => "manual",
        }
    }

    /// Exits that arm the per-token re-entry cooldown.
    pub fn arms_cooldown(&self) -> bool {
        matches!(self, Self::StopLoss | Self::TrailingStop)
    }
}

/// An open paper position on a Solana DEX token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPosition {
    pub token_address: String,
    pub symbol: String,
    /// Execution price after buy-side slippage (USD)
    pub entry_price: f64,
    pub entry_stake_sol: f64,
    pub entry_time: DateTime<Utc>,
    pub token_amount: f64,
    /// Monotonically non-decreasing; never below entry_price
    pub peak_price: f64,
    pub entry_momentum_score: f64,
    pub entry_liquidity: f64,
    pub tier: Tier,
    /// Consecutive scans the token has been absent from
    #[serde(default)]
    pub missed_scans: u32,
    /// Latest quoted price seen in a scan; exit math falls back to the entry
    /// price when a token was never re-quoted
    #[serde(default)]
    pub last_price: Option<f64>,
}

impl DexPosition {
    pub fn pl_pct(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (current_price - self.entry_price) / self.entry_price * 100.0
    }

    /// Mark-to-market value in SOL at the given token price and SOL/USD.
    pub fn value_sol(&self, current_price: f64, sol_usd: f64) -> f64 {
        if sol_usd <= 0.0 {
            return self.entry_stake_sol;
        }
        self.token_amount * current_price / sol_usd
    }
}

/// Immutable ledger row written when a DEX paper position exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexTradeRecord {
    pub symbol: String,
    pub token_address: String,
    pub entry_price: f64,
    /// Execution price after sell-side slippage (USD)
    pub exit_price: f64,
    pub entry_stake_sol: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl_pct: f64,
    pub pnl_sol: f64,
    pub exit_reason: ExitReason,
}

/// Per-token lockout after a stop-loss or trailing-stop exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossCooldown {
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub fallback_expiry: DateTime<Utc>,
}

/// One stop-loss occurrence, kept in a rolling window for the circuit
/// breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
}

/// Point-in-time valuation of the paper portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub balance_sol: f64,
    pub positions_value_sol: f64,
    pub total_value_sol: f64,
    pub open_positions: usize,
}

/// How paper execution prices deviate from quoted prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    None,
    Conservative,
    Realistic,
}

impl SlippageModel {
    /// (base fraction, impact multiplier)
    pub fn params(&self) -> (f64, f64) {
        match self {
            Self::None => (0.0, 0.0),
            Self::Conservative => (0.005, 2.0),
            Self::Realistic => (0.01, 5.0),
        }
    }
}

// ============================================================================
// Crisis monitor
// ============================================================================

/// Macro stress severity. Gates sizing at 1-2 and forces liquidation at 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CrisisLevel {
    Normal = 0,
    Elevated = 1,
    HighAlert = 2,
    FullCrisis = 3,
}

impl CrisisLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 6 => Self::FullCrisis,
            4..=5 => Self::HighAlert,
            2..=3 => Self::Elevated,
            _ => Self::Normal,
        }
    }

    /// Position-size multiplier applied to new equity/crypto entries.
    pub fn position_multiplier(&self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Elevated => 0.5,
            Self::HighAlert | Self::FullCrisis => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::HighAlert => "high_alert",
            Self::FullCrisis => "full_crisis",
        }
    }
}

/// Latest fetched macro indicator values. Every field is optional: a failed
/// fetch scores zero rather than aborting the check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrisisIndicators {
    pub vix: Option<f64>,
    /// Synthetic high-yield spread proxy in bps (see crisis module)
    pub hy_spread: Option<f64>,
    /// 10y-2y treasury spread, percentage points
    pub yc_2y10y: Option<f64>,
    pub ted: Option<f64>,
    pub btc_price: Option<f64>,
    pub btc_weekly_pct: Option<f64>,
    pub usdt_peg: Option<f64>,
    pub dxy: Option<f64>,
    pub usdjpy: Option<f64>,
    pub kre: Option<f64>,
    pub kre_weekly_pct: Option<f64>,
    pub gold_silver_ratio: Option<f64>,
    pub silver_weekly_pct: Option<f64>,
    /// No data source wired; permanently None and scored as zero
    pub stocks_above_200ma: Option<f64>,
    pub fed_balance_sheet: Option<f64>,
    pub fed_change_pct: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisState {
    pub level: CrisisLevel,
    pub indicators: CrisisIndicators,
    pub triggered_indicators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_level_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub positions_closed_in_crisis: Vec<String>,
    #[serde(default)]
    pub manual_override: bool,
}

impl Default for CrisisState {
    fn default() -> Self {
        Self {
            level: CrisisLevel::Normal,
            indicators: CrisisIndicators::default(),
            triggered_indicators: Vec::new(),
            paused_until: None,
            last_level_change: None,
            positions_closed_in_crisis: Vec::new(),
            manual_override: false,
        }
    }
}

// ============================================================================
// LLM research
// ============================================================================

/// Analyst recommendation for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Buy,
    Sell,
    Hold,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

/// Parsed result of one LLM research call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub symbol: String,
    pub verdict: Verdict,
    /// Confidence in (0, 1]
    pub confidence: f64,
    pub reasoning: String,
    /// "excellent" | "good" | "fair" | "poor"
    #[serde(default)]
    pub entry_quality: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a Twitter cross-check on a researched symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfirmation {
    pub symbol: String,
    pub verdict: ConfirmationVerdict,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationVerdict {
    Confirm,
    Contradict,
    Neutral,
}

/// Cached staleness verdict for a held symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessAnalysis {
    pub symbol: String,
    pub score: f64,
    pub is_stale: bool,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Plan assembled in the pre-market window, executed just after the open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremarketPlan {
    pub created_at: DateTime<Utc>,
    pub actions: Vec<PlannedAction>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub symbol: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
}

// ============================================================================
// Logs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One row of the in-state log ring buffer (the dashboard's primary feedback
/// surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_level_from_score_boundaries() {
        assert_eq!(CrisisLevel::from_score(0), CrisisLevel::Normal);
        assert_eq!(CrisisLevel::from_score(1), CrisisLevel::Normal);
        assert_eq!(CrisisLevel::from_score(2), CrisisLevel::Elevated);
        assert_eq!(CrisisLevel::from_score(3), CrisisLevel::Elevated);
        assert_eq!(CrisisLevel::from_score(4), CrisisLevel::HighAlert);
        assert_eq!(CrisisLevel::from_score(5), CrisisLevel::HighAlert);
        assert_eq!(CrisisLevel::from_score(6), CrisisLevel::FullCrisis);
        assert_eq!(CrisisLevel::from_score(11), CrisisLevel::FullCrisis);
    }

    #[test]
    fn position_multiplier_gates_entries_at_high_levels() {
        assert_eq!(CrisisLevel::Normal.position_multiplier(), 1.0);
        assert_eq!(CrisisLevel::Elevated.position_multiplier(), 0.5);
        assert_eq!(CrisisLevel::HighAlert.position_multiplier(), 0.0);
        assert_eq!(CrisisLevel::FullCrisis.position_multiplier(), 0.0);
    }

    #[test]
    fn dex_position_pl_pct() {
        let pos = DexPosition {
            token_address: "addr".into(),
            symbol: "TEST".into(),
            entry_price: 1.0,
            entry_stake_sol: 0.1,
            entry_time: Utc::now(),
            token_amount: 20.0,
            peak_price: 1.0,
            entry_momentum_score: 70.0,
            entry_liquidity: 50_000.0,
            tier: Tier::Early,
            missed_scans: 0,
            last_price: None,
        };
        assert!((pos.pl_pct(1.5) - 50.0).abs() < 1e-9);
        assert!((pos.pl_pct(0.8) + 20.0).abs() < 1e-9);
    }

    #[test]
    fn exit_reason_cooldown_arming() {
        assert!(ExitReason::StopLoss.arms_cooldown());
        assert!(ExitReason::TrailingStop.arms_cooldown());
        assert!(!ExitReason::TakeProfit.arms_cooldown());
        assert!(!ExitReason::LostMomentum.arms_cooldown());
        assert!(!ExitReason::Manual.arms_cooldown());
    }
}

//! Root agent state.
//!
//! A single `AgentState` value is exclusively owned by the actor; every
//! mutation happens inside a tick or an admin message on the same channel.
//! The whole struct serializes to one JSON blob (the `"state"` key of the
//! store), so every field carries a serde default and `migrate()` repairs
//! whatever an older blob is missing.

use crate::config::TradingConfig;
use crate::domain::{
    CrisisState, DexPosition, DexTradeRecord, LogEntry, LogLevel, PortfolioSnapshot,
    PositionEntry, PremarketPlan, ResearchResult, Signal, SocialPoint, StalenessAnalysis,
    StopLossCooldown, StopLossEvent, TwitterConfirmation,
};
use crate::llm::costs::CostTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

const LOG_CAP: usize = 500;
const SIGNAL_CAP: usize = 200;
const SNAPSHOT_CAP: usize = 288;

fn default_missing_balance() -> f64 {
    -1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentState {
    pub config: TradingConfig,
    pub enabled: bool,

    // Signals
    pub signal_cache: Vec<Signal>,
    pub social_history: HashMap<String, Vec<SocialPoint>>,

    // Equity/crypto book-keeping
    pub position_entries: HashMap<String, PositionEntry>,
    pub signal_research: HashMap<String, ResearchResult>,
    pub position_research: HashMap<String, ResearchResult>,
    pub staleness_analysis: HashMap<String, StalenessAnalysis>,
    pub twitter_confirmations: HashMap<String, TwitterConfirmation>,
    pub twitter_daily_reads: u32,
    pub twitter_daily_reset: Option<DateTime<Utc>>,
    pub premarket_plan: Option<PremarketPlan>,

    // DEX paper book
    pub dex_signals: Vec<crate::adapters::dexmon::TokenCandidate>,
    pub dex_positions: HashMap<String, DexPosition>,
    pub dex_trade_history: Vec<DexTradeRecord>,
    pub dex_realized_pnl_sol: f64,
    /// Sentinel default: a blob missing this field reads as -1.0 and is
    /// reset to the configured starting balance by `migrate`
    #[serde(default = "default_missing_balance")]
    pub dex_paper_balance_sol: f64,
    pub dex_portfolio_history: Vec<PortfolioSnapshot>,

    // Streak / drawdown
    pub dex_max_consecutive_losses: u32,
    pub dex_current_loss_streak: u32,
    pub dex_max_drawdown_pct: f64,
    pub dex_max_drawdown_duration_ms: i64,
    pub dex_drawdown_start_time: Option<DateTime<Utc>>,
    pub dex_peak_balance: f64,
    pub dex_peak_value: f64,
    pub dex_drawdown_paused: bool,

    // Circuit breaker
    pub dex_recent_stop_losses: Vec<StopLossEvent>,
    pub dex_circuit_breaker_until: Option<DateTime<Utc>>,

    // Stop-loss cooldowns, keyed by token address
    pub dex_stop_loss_cooldowns: HashMap<String, StopLossCooldown>,

    // Crisis
    pub crisis_state: CrisisState,

    // Tick bookkeeping
    pub last_data_gather: Option<DateTime<Utc>>,
    pub last_analyst: Option<DateTime<Utc>>,
    pub last_research: Option<DateTime<Utc>>,
    pub last_position_research: Option<DateTime<Utc>>,
    pub last_dex_scan: Option<DateTime<Utc>>,
    pub last_crisis_check: Option<DateTime<Utc>>,

    pub logs: Vec<LogEntry>,
    pub cost_tracker: CostTracker,
}

impl AgentState {
    /// Fresh state with defaults applied and the paper balance seeded.
    pub fn new() -> Self {
        let mut state = AgentState::default();
        state.dex_paper_balance_sol = state.config.dex.starting_balance_sol;
        state.dex_peak_balance = state.dex_paper_balance_sol;
        state.dex_peak_value = state.dex_paper_balance_sol;
        state
    }

    /// Repair a freshly deserialized blob from an older schema: substitute
    /// defaults for missing/invalid fields and patch legacy DEX rows. Lossy
    /// patches are logged, never silent.
    pub fn migrate(&mut self) {
        for field in self.config.sanitize() {
            warn!("state migrate: reset invalid config field {}", field);
            self.log(LogLevel::Warn, "migrate", format!("reset config field {field}"));
        }

        if !self.dex_paper_balance_sol.is_finite() || self.dex_paper_balance_sol < 0.0 {
            warn!(
                "state migrate: invalid paper balance {}, resetting to {}",
                self.dex_paper_balance_sol, self.config.dex.starting_balance_sol
            );
            self.dex_paper_balance_sol = self.config.dex.starting_balance_sol;
        }
        if !self.dex_peak_balance.is_finite() || self.dex_peak_balance <= 0.0 {
            self.dex_peak_balance = self.dex_paper_balance_sol;
        }
        if !self.dex_peak_value.is_finite() || self.dex_peak_value <= 0.0 {
            self.dex_peak_value = self.dex_peak_balance;
        }
        if !self.dex_realized_pnl_sol.is_finite() {
            self.dex_realized_pnl_sol = 0.0;
        }
        if !self.dex_max_drawdown_pct.is_finite() {
            self.dex_max_drawdown_pct = 0.0;
        }

        // Legacy position rows (pre token_amount/entry_stake_sol schema).
        // Patching from max_position_sol is lossy; surface it.
        let max_position_sol = self.config.dex.max_position_sol;
        let fallback_sol = self.config.dex.sol_price_fallback_usd;
        let mut patched = Vec::new();
        for (addr, pos) in self.dex_positions.iter_mut() {
            if pos.entry_stake_sol <= 0.0 || !pos.entry_stake_sol.is_finite() {
                pos.entry_stake_sol = max_position_sol;
                patched.push(addr.clone());
            }
            if pos.token_amount <= 0.0 || !pos.token_amount.is_finite() {
                pos.token_amount = if pos.entry_price > 0.0 {
                    pos.entry_stake_sol * fallback_sol / pos.entry_price
                } else {
                    0.0
                };
                if !patched.contains(addr) {
                    patched.push(addr.clone());
                }
            }
            if pos.peak_price < pos.entry_price || !pos.peak_price.is_finite() {
                pos.peak_price = pos.entry_price;
            }
        }
        for addr in patched {
            warn!(
                "state migrate: patched legacy position {} from max_position_sol; \
                 stake/token amount are estimates",
                addr
            );
            self.log(
                LogLevel::Warn,
                "migrate",
                format!("legacy position {addr} patched from max_position_sol"),
            );
        }

        if self.logs.len() > LOG_CAP {
            let excess = self.logs.len() - LOG_CAP;
            self.logs.drain(..excess);
        }
        info!("state migrated: {} signals, {} dex positions, balance {:.4} SOL",
            self.signal_cache.len(),
            self.dex_positions.len(),
            self.dex_paper_balance_sol
        );
    }

    /// Append to the in-state ring buffer and mirror to tracing.
    pub fn log(&mut self, level: LogLevel, source: &str, message: String) {
        match level {
            LogLevel::Info => info!(target: "gambit::agent", "[{}] {}", source, message),
            LogLevel::Warn => warn!(target: "gambit::agent", "[{}] {}", source, message),
            LogLevel::Error => {
                tracing::error!(target: "gambit::agent", "[{}] {}", source, message)
            }
        }
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            source: source.to_string(),
            message,
        });
        if self.logs.len() > LOG_CAP {
            let excess = self.logs.len() - LOG_CAP;
            self.logs.drain(..excess);
        }
    }

    /// Merge new signals into the cache: drop entries past the 24 h TTL and
    /// keep the 200 most sentiment-extreme.
    pub fn merge_signals(&mut self, fresh: Vec<Signal>, now: DateTime<Utc>) {
        self.signal_cache.extend(fresh);
        let cutoff = now - chrono::Duration::hours(24);
        self.signal_cache.retain(|s| s.timestamp > cutoff);
        if self.signal_cache.len() > SIGNAL_CAP {
            self.signal_cache.sort_by(|a, b| {
                b.sentiment
                    .abs()
                    .partial_cmp(&a.sentiment.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            self.signal_cache.truncate(SIGNAL_CAP);
        }
    }

    /// Record one portfolio valuation point, capped to ~24 h of history.
    pub fn push_snapshot(&mut self, snapshot: PortfolioSnapshot) {
        self.dex_portfolio_history.push(snapshot);
        if self.dex_portfolio_history.len() > SNAPSHOT_CAP {
            let excess = self.dex_portfolio_history.len() - SNAPSHOT_CAP;
            self.dex_portfolio_history.drain(..excess);
        }
    }

    /// Rolling 24 h Twitter read budget. Returns true and increments when a
    /// read is allowed.
    pub fn try_consume_twitter_read(&mut self, now: DateTime<Utc>) -> bool {
        let budget = self.config.signals.twitter_daily_read_budget;
        match self.twitter_daily_reset {
            Some(reset) if now - reset < chrono::Duration::hours(24) => {
                if self.twitter_daily_reads >= budget {
                    return false;
                }
                self.twitter_daily_reads += 1;
                true
            }
            _ => {
                self.twitter_daily_reset = Some(now);
                self.twitter_daily_reads = 1;
                budget > 0
            }
        }
    }
}

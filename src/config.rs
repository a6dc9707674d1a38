//! Configuration.
//!
//! Two layers, loaded differently:
//!
//! - [`AppConfig`]: process bootstrap (ports, file paths, API credentials).
//!   Loaded once at startup from `gambit.toml` plus `GAMBIT_*` environment
//!   overrides. Never mutated at runtime.
//! - [`TradingConfig`]: runtime tunables. Lives inside the persisted agent
//!   state, every field has a default so a blank config is valid, and
//!   `POST /config` deep-merges a partial JSON patch over it.

use crate::domain::SlippageModel;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Bootstrap config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Admin HTTP listen port (default: 8080)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Directory for the persisted state blob and alarm file
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Bearer token required on mutating admin routes
    #[serde(default)]
    pub api_token: String,
    /// Separate secret for POST /kill
    #[serde(default)]
    pub kill_switch_secret: String,
    #[serde(default)]
    pub broker: BrokerCredentials,
    #[serde(default)]
    pub llm: LlmCredentials,
    /// FRED API key for yield-curve / TED / Fed balance-sheet series
    #[serde(default)]
    pub fred_api_key: String,
    #[serde(default)]
    pub discord_webhook_url: String,
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Trading API base (paper by default)
    #[serde(default = "default_broker_base_url")]
    pub base_url: String,
    /// Market data API base
    #[serde(default = "default_broker_data_url")]
    pub data_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_state_dir() -> String {
    "./data".to_string()
}
fn default_broker_base_url() -> String {
    "https://paper-api.alpaca.markets".to_string()
}
fn default_broker_data_url() -> String {
    "https://data.alpaca.markets".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl AppConfig {
    /// Load from an optional TOML file plus `GAMBIT_*` env overrides
    /// (e.g. `GAMBIT_BROKER__API_KEY`).
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        let mut builder = Config::builder();
        if let Some(p) = path {
            builder = builder.add_source(File::from(Path::new(p)).required(true));
        } else if Path::new("gambit.toml").exists() {
            builder = builder.add_source(File::with_name("gambit"));
        }
        let cfg = builder
            .add_source(Environment::with_prefix("GAMBIT").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

// ============================================================================
// Runtime tunables
// ============================================================================

/// All runtime tunables, grouped. Persisted inside `AgentState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradingConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub dex: DexConfig,
    #[serde(default)]
    pub crisis: CrisisConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    pub tick_interval_ms: u64,
    pub data_poll_interval_ms: u64,
    pub stocks_enabled: bool,
    pub crypto_enabled: bool,
    pub dex_enabled: bool,
    pub options_enabled: bool,
    pub twitter_enabled: bool,
    pub crisis_mode_enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30_000,
            data_poll_interval_ms: 60_000,
            stocks_enabled: true,
            crypto_enabled: true,
            dex_enabled: true,
            options_enabled: false,
            twitter_enabled: false,
            crisis_mode_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    /// Exponential decay half-life for signal freshness (minutes)
    pub decay_half_life_minutes: f64,
    /// Minimum raw sentiment for a signal to become an entry candidate
    pub min_sentiment_score: f64,
    /// Subreddits polled each data-gather pass
    pub subreddits: Vec<String>,
    /// User-supplied ticker blacklist, merged with the built-in word list
    pub ticker_blacklist: Vec<String>,
    /// Daily Twitter read budget (rolling 24 h window)
    pub twitter_daily_read_budget: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            decay_half_life_minutes: 120.0,
            min_sentiment_score: 0.3,
            subreddits: vec![
                "wallstreetbets".to_string(),
                "stocks".to_string(),
                "investing".to_string(),
                "options".to_string(),
            ],
            ticker_blacklist: Vec::new(),
            twitter_daily_read_budget: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraderConfig {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    /// Percent of cash per position, capped at 20 in sizing
    pub position_size_pct_of_cash: f64,
    /// Hard ceiling per position (USD)
    pub max_position_value: f64,
    pub min_analyst_confidence: f64,
    /// Minimum hold time before an analyst SELL is honored (minutes)
    pub llm_min_hold_minutes: i64,
    pub analyst_interval_ms: u64,
    pub allowed_exchanges: Vec<String>,
    /// PDT equity floor (USD)
    pub pdt_min_equity: f64,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: 10.0,
            stop_loss_pct: 5.0,
            position_size_pct_of_cash: 10.0,
            max_position_value: 5_000.0,
            min_analyst_confidence: 0.7,
            llm_min_hold_minutes: 30,
            analyst_interval_ms: 900_000,
            allowed_exchanges: vec![
                "NYSE".to_string(),
                "NASDAQ".to_string(),
                "ARCA".to_string(),
                "AMEX".to_string(),
                "BATS".to_string(),
            ],
            pdt_min_equity: 25_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StalenessConfig {
    pub min_hold_hours: f64,
    pub mid_hold_days: f64,
    pub max_hold_days: f64,
    /// Gain below which a max-hold position is considered dead money (%)
    pub min_gain_pct: f64,
    /// Gain below which a mid-hold position scores extra points (%)
    pub mid_min_gain_pct: f64,
    /// Volume ratio at or below which social interest has collapsed
    pub social_volume_decay: f64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            min_hold_hours: 24.0,
            mid_hold_days: 3.0,
            max_hold_days: 7.0,
            min_gain_pct: 5.0,
            mid_min_gain_pct: 2.0,
            social_volume_decay: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptionsConfig {
    pub min_confidence: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_delta: f64,
    pub max_delta: f64,
    /// Fraction of account equity risked per options trade
    pub max_pct_per_trade: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.85,
            min_dte: 14,
            max_dte: 45,
            min_delta: 0.35,
            max_delta: 0.65,
            max_pct_per_trade: 0.02,
            stop_loss_pct: 50.0,
            take_profit_pct: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DexConfig {
    pub starting_balance_sol: f64,
    pub scan_interval_ms: u64,
    pub min_momentum_score: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub trailing_stop_enabled: bool,
    pub trailing_stop_activation_pct: f64,
    pub trailing_stop_distance_pct: f64,
    /// Activation for microspray/breakout/lottery tiers
    pub lottery_trailing_activation_pct: f64,
    pub lottery_trailing_distance_pct: f64,
    /// Shared cap for early/established positions
    pub max_positions: usize,
    pub microspray_position_sol: f64,
    pub microspray_max_positions: usize,
    pub breakout_position_sol: f64,
    pub breakout_max_positions: usize,
    pub lottery_position_sol: f64,
    pub lottery_max_positions: usize,
    /// Fraction of balance per early/established entry
    pub pct_of_balance: f64,
    /// Sizing haircut for the early tier
    pub early_multiplier: f64,
    pub max_position_sol: f64,
    pub min_viable_position_sol: f64,
    /// New position may not exceed this percent of total portfolio value
    pub max_single_position_pct: f64,
    pub slippage_model: SlippageModel,
    pub gas_fee_sol: f64,
    pub sol_price_fallback_usd: f64,
    pub stop_loss_cooldown_hours: f64,
    /// Price recovery (fraction above exit price) that re-allows entry
    pub reentry_recovery_pct: f64,
    pub reentry_min_momentum: f64,
    pub reentry_min_elapsed_minutes: i64,
    pub circuit_breaker_losses: usize,
    pub circuit_breaker_window_hours: f64,
    pub circuit_breaker_pause_hours: f64,
    pub breaker_min_cooldown_minutes: i64,
    pub max_drawdown_pct: f64,
    /// Consecutive scan misses before a losing position exits lost_momentum
    pub lost_momentum_max_missed_scans: u32,
    /// Exit when current momentum falls below this fraction of entry momentum
    pub momentum_decay_ratio: f64,
    /// Liquidity must cover this multiple of position value for a safe exit
    pub liquidity_exit_multiple: f64,
    pub chart_analysis_enabled: bool,
    pub chart_min_entry_score: f64,
    pub cooldown_retention_hours: f64,
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            starting_balance_sol: 10.0,
            scan_interval_ms: 30_000,
            min_momentum_score: 60.0,
            take_profit_pct: 100.0,
            stop_loss_pct: 20.0,
            trailing_stop_enabled: true,
            trailing_stop_activation_pct: 50.0,
            trailing_stop_distance_pct: 25.0,
            lottery_trailing_activation_pct: 100.0,
            lottery_trailing_distance_pct: 20.0,
            max_positions: 8,
            microspray_position_sol: 0.005,
            microspray_max_positions: 10,
            breakout_position_sol: 0.015,
            breakout_max_positions: 5,
            lottery_position_sol: 0.02,
            lottery_max_positions: 5,
            pct_of_balance: 0.05,
            early_multiplier: 0.5,
            max_position_sol: 0.5,
            min_viable_position_sol: 0.01,
            max_single_position_pct: 40.0,
            slippage_model: SlippageModel::Realistic,
            gas_fee_sol: 0.00001,
            sol_price_fallback_usd: 200.0,
            stop_loss_cooldown_hours: 4.0,
            reentry_recovery_pct: 0.15,
            reentry_min_momentum: 70.0,
            reentry_min_elapsed_minutes: 5,
            circuit_breaker_losses: 3,
            circuit_breaker_window_hours: 24.0,
            circuit_breaker_pause_hours: 1.0,
            breaker_min_cooldown_minutes: 30,
            max_drawdown_pct: 35.0,
            lost_momentum_max_missed_scans: 10,
            momentum_decay_ratio: 0.4,
            liquidity_exit_multiple: 5.0,
            chart_analysis_enabled: true,
            chart_min_entry_score: 40.0,
            cooldown_retention_hours: 24.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrisisConfig {
    pub check_interval_ms: u64,
    pub vix_warning: f64,
    pub vix_elevated: f64,
    pub vix_critical: f64,
    pub hy_spread_warning: f64,
    pub hy_spread_critical: f64,
    pub yc_inversion_warning: f64,
    pub yc_inversion_critical: f64,
    pub ted_warning: f64,
    pub ted_critical: f64,
    pub btc_weekly_warning_pct: f64,
    pub btc_weekly_critical_pct: f64,
    pub usdt_peg_warning: f64,
    pub usdt_peg_critical: f64,
    pub dxy_warning: f64,
    pub dxy_critical: f64,
    pub usdjpy_warning: f64,
    pub usdjpy_critical: f64,
    pub kre_weekly_warning_pct: f64,
    pub kre_weekly_critical_pct: f64,
    pub gold_silver_warning: f64,
    pub gold_silver_critical: f64,
    pub silver_weekly_warning_pct: f64,
    pub silver_weekly_critical_pct: f64,
    pub stocks_above_200ma_warning: f64,
    pub stocks_above_200ma_critical: f64,
    pub fed_change_warning_pct: f64,
    pub fed_change_critical_pct: f64,
    /// Tighter equity stop while at level 1 (%)
    pub level1_stop_loss_pct: f64,
    /// Level 2 closes positions with P&L below this (%)
    pub level2_min_profit_to_hold: f64,
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 600_000,
            vix_warning: 25.0,
            vix_elevated: 30.0,
            vix_critical: 40.0,
            hy_spread_warning: 450.0,
            hy_spread_critical: 600.0,
            yc_inversion_warning: -0.5,
            yc_inversion_critical: -1.0,
            ted_warning: 0.5,
            ted_critical: 1.0,
            btc_weekly_warning_pct: -10.0,
            btc_weekly_critical_pct: -20.0,
            usdt_peg_warning: 0.005,
            usdt_peg_critical: 0.015,
            dxy_warning: 106.0,
            dxy_critical: 110.0,
            usdjpy_warning: 155.0,
            usdjpy_critical: 160.0,
            kre_weekly_warning_pct: -10.0,
            kre_weekly_critical_pct: -20.0,
            gold_silver_warning: 90.0,
            gold_silver_critical: 100.0,
            silver_weekly_warning_pct: -10.0,
            silver_weekly_critical_pct: -15.0,
            stocks_above_200ma_warning: 30.0,
            stocks_above_200ma_critical: 20.0,
            fed_change_warning_pct: -0.5,
            fed_change_critical_pct: -1.0,
            level1_stop_loss_pct: 5.0,
            level2_min_profit_to_hold: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Model for per-symbol research
    pub research_model: String,
    /// Model for the aggregate analyst pass
    pub analyst_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub research_interval_ms: u64,
    pub position_research_interval_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            research_model: "gpt-4o-mini".to_string(),
            analyst_model: "gpt-4o".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            research_interval_ms: 120_000,
            position_research_interval_ms: 300_000,
        }
    }
}

impl TradingConfig {
    /// Deep-merge a partial JSON patch over the current config. Null patch
    /// values are treated as "leave unchanged", so a sparse dashboard payload
    /// can never blank out a tunable. Unknown keys are ignored.
    pub fn merge_patch(&self, patch: &serde_json::Value) -> crate::error::Result<TradingConfig> {
        let mut current = serde_json::to_value(self)?;
        deep_merge(&mut current, patch);
        let merged: TradingConfig = serde_json::from_value(current)?;
        let problems = merged.validate();
        if !problems.is_empty() {
            return Err(crate::error::GambitError::Validation(problems.join("; ")));
        }
        Ok(merged)
    }

    /// Config invariants. Returns list of problems (empty = valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.general.tick_interval_ms < 1_000 {
            errors.push("general.tick_interval_ms must be >= 1000".to_string());
        }
        if !(0.0..=1.0).contains(&self.trader.min_analyst_confidence) {
            errors.push(format!(
                "trader.min_analyst_confidence must be in [0, 1], got {}",
                self.trader.min_analyst_confidence
            ));
        }
        if self.trader.max_position_value <= 0.0 {
            errors.push("trader.max_position_value must be > 0".to_string());
        }
        if self.dex.starting_balance_sol <= 0.0 {
            errors.push("dex.starting_balance_sol must be > 0".to_string());
        }
        if self.dex.max_single_position_pct <= 0.0 || self.dex.max_single_position_pct > 100.0 {
            errors.push("dex.max_single_position_pct must be in (0, 100]".to_string());
        }
        if self.dex.reentry_recovery_pct < 0.0 {
            errors.push("dex.reentry_recovery_pct must be >= 0".to_string());
        }
        if self.staleness.mid_hold_days >= self.staleness.max_hold_days {
            errors.push("staleness.mid_hold_days must be < max_hold_days".to_string());
        }
        if self.options.min_dte > self.options.max_dte {
            errors.push("options.min_dte must be <= max_dte".to_string());
        }
        errors
    }

    /// Repair non-finite floats that may survive in an old state blob,
    /// substituting the field default. Returns the names of repaired fields.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut fixed = Vec::new();
        let d = TradingConfig::default();
        let mut fix = |name: &str, v: &mut f64, def: f64| {
            if !v.is_finite() {
                *v = def;
                fixed.push(name.to_string());
            }
        };
        fix(
            "signals.decay_half_life_minutes",
            &mut self.signals.decay_half_life_minutes,
            d.signals.decay_half_life_minutes,
        );
        fix(
            "signals.min_sentiment_score",
            &mut self.signals.min_sentiment_score,
            d.signals.min_sentiment_score,
        );
        fix(
            "trader.take_profit_pct",
            &mut self.trader.take_profit_pct,
            d.trader.take_profit_pct,
        );
        fix(
            "trader.stop_loss_pct",
            &mut self.trader.stop_loss_pct,
            d.trader.stop_loss_pct,
        );
        fix(
            "trader.position_size_pct_of_cash",
            &mut self.trader.position_size_pct_of_cash,
            d.trader.position_size_pct_of_cash,
        );
        fix(
            "trader.max_position_value",
            &mut self.trader.max_position_value,
            d.trader.max_position_value,
        );
        fix(
            "dex.starting_balance_sol",
            &mut self.dex.starting_balance_sol,
            d.dex.starting_balance_sol,
        );
        fix(
            "dex.take_profit_pct",
            &mut self.dex.take_profit_pct,
            d.dex.take_profit_pct,
        );
        fix(
            "dex.stop_loss_pct",
            &mut self.dex.stop_loss_pct,
            d.dex.stop_loss_pct,
        );
        fix(
            "dex.max_position_sol",
            &mut self.dex.max_position_sol,
            d.dex.max_position_sol,
        );
        fix(
            "dex.max_drawdown_pct",
            &mut self.dex.max_drawdown_pct,
            d.dex.max_drawdown_pct,
        );
        fixed
    }
}

/// Recursive object merge; null patch values are skipped, scalars and arrays
/// replace.
pub fn deep_merge(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (k, pv) in patch_map {
                if pv.is_null() {
                    continue;
                }
                match base_map.get_mut(k) {
                    Some(bv) if bv.is_object() && pv.is_object() => deep_merge(bv, pv),
                    Some(bv) => *bv = pv.clone(),
                    None => {
                        base_map.insert(k.clone(), pv.clone());
                    }
                }
            }
        }
        (base, patch) => {
            if !patch.is_null() {
                *base = patch.clone();
            }
        }
    }
}

//! The message-serialized actor.
//!
//! One worker task exclusively owns `AgentState`. Ticks and admin commands
//! arrive on the same channel, so no two units of work ever overlap and no
//! suspension can observe a half-applied mutation from another caller. The
//! alarm is a persisted timestamp; the worker sleeps toward it and runs a
//! tick when it fires.

use crate::adapters::broker::Broker;
use crate::adapters::dexmon::{DexProvider, SolPriceCache};
use crate::agent::tick;
use crate::crisis::indicators::IndicatorClient;
use crate::domain::{CrisisLevel, LogLevel};
use crate::error::{GambitError, Result};
use crate::llm::LlmClient;
use crate::notify::Notifier;
use crate::persistence::StateStore;
use crate::signals::twitter::TwitterSource;
use crate::signals::SignalGatherers;
use crate::state::AgentState;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Everything the actor talks to. All trait objects so tests can stub them.
pub struct AgentDeps {
    pub broker: Arc<dyn Broker>,
    pub llm: Arc<dyn LlmClient>,
    pub dex_provider: Arc<dyn DexProvider>,
    pub sol_price: SolPriceCache,
    pub twitter: Arc<dyn TwitterSource>,
    pub indicators: IndicatorClient,
    pub gatherers: SignalGatherers,
    pub store: Arc<dyn StateStore>,
    pub notifier: Arc<Notifier>,
}

#[derive(Debug)]
pub enum AgentMsg {
    Tick,
    Trigger(oneshot::Sender<Value>),
    Status(oneshot::Sender<Value>),
    Logs {
        limit: usize,
        reply: oneshot::Sender<Value>,
    },
    Costs(oneshot::Sender<Value>),
    Signals(oneshot::Sender<Value>),
    Enable(oneshot::Sender<Value>),
    Disable(oneshot::Sender<Value>),
    Kill(oneshot::Sender<Value>),
    MergeConfig {
        patch: Value,
        reply: oneshot::Sender<std::result::Result<Value, String>>,
    },
    DexReset(oneshot::Sender<Value>),
    DexClearCooldowns(oneshot::Sender<Value>),
    DexClearBreaker(oneshot::Sender<Value>),
    CrisisToggle {
        manual_override: Option<bool>,
        level: Option<u8>,
        reply: oneshot::Sender<Value>,
    },
    CrisisCheck(oneshot::Sender<Value>),
}

/// Cheap cloneable handle used by the HTTP layer.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentMsg>,
}

impl AgentHandle {
    pub async fn send(&self, msg: AgentMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| GambitError::Validation("agent actor is gone".to_string()))
    }

    pub async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> AgentMsg,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|_| GambitError::Validation("agent actor dropped the reply".to_string()))
    }
}

/// Load state, migrate, and start the worker task. Returns the handle.
pub async fn spawn(deps: AgentDeps) -> Result<AgentHandle> {
    let state = match deps.store.load_state().await? {
        Some(blob) => match serde_json::from_value::<AgentState>(blob) {
            Ok(mut loaded) => {
                loaded.migrate();
                loaded
            }
            Err(e) => {
                // a blob we cannot parse is unrecoverable; start fresh loudly
                error!("state blob unreadable ({e}), starting from defaults");
                AgentState::new()
            }
        },
        None => {
            info!("no persisted state, starting fresh");
            AgentState::new()
        }
    };

    let mut next_alarm = deps.store.load_alarm().await?;
    if state.enabled && next_alarm.is_none() {
        next_alarm = Some(Utc::now());
        deps.store.save_alarm(next_alarm.unwrap()).await?;
    }

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let actor = Actor {
        state,
        deps,
        next_alarm,
    };
    tokio::spawn(actor.run(rx));
    Ok(AgentHandle { tx })
}

struct Actor {
    state: AgentState,
    deps: AgentDeps,
    next_alarm: Option<DateTime<Utc>>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<AgentMsg>) {
        info!(
            "agent actor started (enabled={}, alarm={:?})",
            self.state.enabled, self.next_alarm
        );
        loop {
            let sleep_for = self
                .next_alarm
                .map(|at| (at - Utc::now()).to_std().unwrap_or_default());

            tokio::select! {
                maybe_msg = rx.recv() => match maybe_msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                _ = tokio::time::sleep(sleep_for.unwrap_or_default()), if sleep_for.is_some() => {
                    self.run_tick().await;
                }
            }
        }
        info!("agent actor stopped");
    }

    async fn run_tick(&mut self) {
        self.next_alarm = tick::run_tick(&mut self.state, &self.deps).await;
        self.persist().await;
        match self.next_alarm {
            Some(at) => {
                if let Err(e) = self.deps.store.save_alarm(at).await {
                    warn!("alarm save failed: {e}");
                }
            }
            None => {
                if let Err(e) = self.deps.store.clear_alarm().await {
                    warn!("alarm clear failed: {e}");
                }
            }
        }
    }

    /// Persist the state blob. A failed save is logged; the work it covered
    /// is re-done from the old blob after a crash, which every tick step
    /// tolerates.
    async fn persist(&mut self) {
        match serde_json::to_value(&self.state) {
            Ok(blob) => {
                if let Err(e) = self.deps.store.save_state(&blob).await {
                    error!("state save failed: {e}");
                }
            }
            Err(e) => error!("state serialization failed: {e}"),
        }
    }

    async fn handle(&mut self, msg: AgentMsg) {
        match msg {
            AgentMsg::Tick => self.run_tick().await,
            AgentMsg::Trigger(reply) => {
                self.run_tick().await;
                let _ = reply.send(json!({"ok": true, "next_alarm": self.next_alarm}));
            }
            AgentMsg::Status(reply) => {
                let status = self.build_status().await;
                let _ = reply.send(status);
            }
            AgentMsg::Logs { limit, reply } => {
                let logs: Vec<&crate::domain::LogEntry> =
                    self.state.logs.iter().rev().take(limit).collect();
                let _ = reply.send(json!({ "logs": logs }));
            }
            AgentMsg::Costs(reply) => {
                let _ = reply.send(json!({ "costs": self.state.cost_tracker }));
            }
            AgentMsg::Signals(reply) => {
                let _ = reply.send(json!({
                    "signals": self.state.signal_cache,
                    "dex_signals": self.state.dex_signals,
                }));
            }
            AgentMsg::Enable(reply) => {
                self.state.enabled = true;
                if self.next_alarm.is_none() {
                    self.next_alarm = Some(Utc::now());
                    if let Err(e) = self.deps.store.save_alarm(self.next_alarm.unwrap()).await {
                        warn!("alarm save failed: {e}");
                    }
                }
                self.state
                    .log(LogLevel::Info, "admin", "agent enabled".to_string());
                self.persist().await;
                let _ = reply.send(json!({"enabled": true}));
            }
            AgentMsg::Disable(reply) => {
                self.state.enabled = false;
                self.next_alarm = None;
                if let Err(e) = self.deps.store.clear_alarm().await {
                    warn!("alarm clear failed: {e}");
                }
                self.state
                    .log(LogLevel::Info, "admin", "agent disabled".to_string());
                self.persist().await;
                let _ = reply.send(json!({"enabled": false}));
            }
            AgentMsg::Kill(reply) => {
                // kill switch: stop the alarm chain and drop pending intents,
                // but never auto-close open positions
                self.state.enabled = false;
                self.next_alarm = None;
                self.state.signal_cache.clear();
                self.state.premarket_plan = None;
                if let Err(e) = self.deps.store.clear_alarm().await {
                    warn!("alarm clear failed: {e}");
                }
                self.state
                    .log(LogLevel::Warn, "admin", "kill switch engaged".to_string());
                self.persist().await;
                let _ = reply.send(json!({"killed": true, "note": "open positions untouched"}));
            }
            AgentMsg::MergeConfig { patch, reply } => {
                match self.state.config.merge_patch(&patch) {
                    Ok(merged) => {
                        self.state.config = merged;
                        self.state
                            .log(LogLevel::Info, "admin", "config updated".to_string());
                        self.persist().await;
                        let config = serde_json::to_value(&self.state.config)
                            .unwrap_or(Value::Null);
                        let _ = reply.send(Ok(config));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
            AgentMsg::DexReset(reply) => {
                let starting_balance = self.state.config.dex.starting_balance_sol;
                self.state.dex_positions.clear();
                self.state.dex_trade_history.clear();
                self.state.dex_portfolio_history.clear();
                self.state.dex_stop_loss_cooldowns.clear();
                self.state.dex_recent_stop_losses.clear();
                self.state.dex_circuit_breaker_until = None;
                self.state.dex_paper_balance_sol = starting_balance;
                self.state.dex_peak_balance = starting_balance;
                self.state.dex_peak_value = starting_balance;
                self.state.dex_realized_pnl_sol = 0.0;
                self.state.dex_current_loss_streak = 0;
                self.state.dex_max_consecutive_losses = 0;
                self.state.dex_max_drawdown_pct = 0.0;
                self.state.dex_max_drawdown_duration_ms = 0;
                self.state.dex_drawdown_start_time = None;
                self.state.dex_drawdown_paused = false;
                self.state
                    .log(LogLevel::Warn, "admin", "DEX paper book reset".to_string());
                self.persist().await;
                let _ = reply.send(json!({"reset": true}));
            }
            AgentMsg::DexClearCooldowns(reply) => {
                let cleared = self.state.dex_stop_loss_cooldowns.len();
                self.state.dex_stop_loss_cooldowns.clear();
                self.persist().await;
                let _ = reply.send(json!({"cleared": cleared}));
            }
            AgentMsg::DexClearBreaker(reply) => {
                self.state.dex_circuit_breaker_until = None;
                self.state.dex_recent_stop_losses.clear();
                self.persist().await;
                let _ = reply.send(json!({"cleared": true}));
            }
            AgentMsg::CrisisToggle {
                manual_override,
                level,
                reply,
            } => {
                if let Some(flag) = manual_override {
                    self.state.crisis_state.manual_override = flag;
                }
                if let Some(level) = level {
                    let level = match level {
                        0 => CrisisLevel::Normal,
                        1 => CrisisLevel::Elevated,
                        2 => CrisisLevel::HighAlert,
                        _ => CrisisLevel::FullCrisis,
                    };
                    self.state.crisis_state.level = level;
                    self.state.crisis_state.last_level_change = Some(Utc::now());
                }
                self.state.log(
                    LogLevel::Warn,
                    "admin",
                    format!(
                        "crisis override={} level={}",
                        self.state.crisis_state.manual_override,
                        self.state.crisis_state.level.as_str()
                    ),
                );
                self.persist().await;
                let _ = reply.send(json!({ "crisis": self.state.crisis_state }));
            }
            AgentMsg::CrisisCheck(reply) => {
                // force an immediate evaluation regardless of the interval
                self.state.last_crisis_check = None;
                let change =
                    crate::crisis::run_check(&mut self.state, &self.deps.indicators, Utc::now())
                        .await;
                self.persist().await;
                let _ = reply.send(json!({
                    "crisis": self.state.crisis_state,
                    "changed": change.map(|(old, new)| json!([old.as_str(), new.as_str()])),
                }));
            }
        }
    }

    /// Dashboard snapshot: persisted state plus live broker data, with every
    /// external fetch degrading to null on failure.
    async fn build_status(&mut self) -> Value {
        let account = self.deps.broker.get_account().await.ok();
        let positions = self.deps.broker.get_positions().await.ok();
        let clock = self.deps.broker.get_clock().await.ok();
        let sol_usd = self
            .deps
            .sol_price
            .get(self.state.config.dex.sol_price_fallback_usd)
            .await;

        let dex_positions: Vec<Value> = self
            .state
            .dex_positions
            .values()
            .map(|p| {
                let mark = p.last_price.unwrap_or(p.entry_price);
                json!({
                    "position": p,
                    "pl_pct": p.pl_pct(mark),
                    "value_sol": p.value_sol(mark, sol_usd),
                })
            })
            .collect();

        json!({
            "enabled": self.state.enabled,
            "next_alarm": self.next_alarm,
            "account": account.map(|a| json!({
                "cash": a.cash,
                "equity": a.equity,
                "daytrade_count": a.daytrade_count,
            })),
            "positions": positions.map(|ps| ps.iter().map(|p| json!({
                "symbol": p.symbol,
                "qty": p.qty,
                "market_value": p.market_value,
                "unrealized_pl": p.unrealized_pl,
                "pl_pct": p.pl_pct(),
                "asset_class": p.asset_class,
            })).collect::<Vec<_>>()),
            "clock": clock.map(|c| json!({
                "is_open": c.is_open,
                "next_open": c.next_open,
                "next_close": c.next_close,
            })),
            "config": self.state.config,
            "signals": self.state.signal_cache.iter().take(50).collect::<Vec<_>>(),
            "signal_research": self.state.signal_research,
            "position_entries": self.state.position_entries,
            "staleness": self.state.staleness_analysis,
            "premarket_plan": self.state.premarket_plan,
            "dex": {
                "paper_balance_sol": self.state.dex_paper_balance_sol,
                "realized_pnl_sol": self.state.dex_realized_pnl_sol,
                "sol_usd": sol_usd,
                "positions": dex_positions,
                "trade_history": self.state.dex_trade_history.iter().rev().take(50).collect::<Vec<_>>(),
                "portfolio_history": self.state.dex_portfolio_history,
                "metrics": crate::dex::metrics::calculate(&self.state),
                "circuit_breaker_until": self.state.dex_circuit_breaker_until,
                "drawdown_paused": self.state.dex_drawdown_paused,
                "cooldowns": self.state.dex_stop_loss_cooldowns,
            },
            "crisis": self.state.crisis_state,
            "costs": self.state.cost_tracker,
            "logs": self.state.logs.iter().rev().take(100).collect::<Vec<_>>(),
        })
    }
}

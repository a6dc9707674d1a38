//! End-to-end scenarios over the decision logic, driven through the same
//! state-mutating functions the tick uses. No network anywhere: the DEX
//! engine is pure over candidates, and the one broker-facing scenario uses
//! a stub.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use gambit::adapters::broker::{
    Asset, Broker, BrokerAccount, BrokerPosition, MarketClock, OptionContract, OptionSnapshot,
    Order, OrderRequest, Snapshot,
};
use gambit::adapters::dexmon::TokenCandidate;
use gambit::domain::{CrisisIndicators, CrisisLevel, ExitReason, LogLevel, SlippageModel, Tier};
use gambit::dex;
use gambit::error::{GambitError, Result};
use gambit::state::AgentState;
use rust_decimal_macros::dec;

fn candidate(address: &str, price: f64, momentum: f64) -> TokenCandidate {
    TokenCandidate {
        token_address: address.to_string(),
        symbol: format!("T{address}"),
        name: String::new(),
        url: String::new(),
        price_usd: price,
        price_change_5m: None,
        price_change_6h: 20.0,
        price_change_24h: 40.0,
        volume_24h: 200_000.0,
        liquidity: 80_000.0,
        age_hours: 40.0,
        momentum_score: momentum,
        legitimacy_score: 80.0,
        tier: Tier::Established,
        dex_id: "raydium".to_string(),
    }
}

fn paper_state() -> AgentState {
    let mut state = AgentState::new();
    state.config.dex.slippage_model = SlippageModel::None;
    state.config.dex.gas_fee_sol = 0.0;
    state
}

fn enter(state: &mut AgentState, cand: &TokenCandidate) {
    let now = Utc::now();
    assert_eq!(dex::entry_blocker(state, cand, now), None, "{} blocked", cand.symbol);
    dex::execute_paper_buy(state, cand, 200.0, now).unwrap();
}

// ----------------------------------------------------------------------------
// Scenario 1: trailing stop fires instead of take-profit
// ----------------------------------------------------------------------------
#[test]
fn trailing_stop_beats_take_profit_on_retrace() {
    let mut state = paper_state();
    state.config.dex.take_profit_pct = 100.0;
    state.config.dex.trailing_stop_activation_pct = 50.0;
    state.config.dex.trailing_stop_distance_pct = 25.0;

    enter(&mut state, &candidate("tok", 1.00, 75.0));
    let now = Utc::now();

    // $1.00 -> $1.80: peak ratchets, no exit
    assert!(dex::process_exits(&mut state, &[candidate("tok", 1.80, 75.0)], 200.0, now).is_empty());
    // $1.80 -> $1.34: below 1.80 × 0.75 = 1.35
    let trades = dex::process_exits(&mut state, &[candidate("tok", 1.34, 75.0)], 200.0, now);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, ExitReason::TrailingStop);
    assert!((trades[0].exit_price - 1.34).abs() < 1e-9);
}

// ----------------------------------------------------------------------------
// Scenario 2: stop-loss cooldown price recovery vs momentum path
// ----------------------------------------------------------------------------
#[test]
fn cooldown_blocks_then_reopens_via_momentum() {
    let mut state = paper_state();
    // reentry_recovery_pct 0.15, reentry_min_momentum 70, min wait 5 min
    enter(&mut state, &candidate("tok", 0.625, 75.0));

    // crash through the stop: -20%
    let exit_time = Utc::now();
    let trades = dex::process_exits(&mut state, &[candidate("tok", 0.50, 75.0)], 200.0, exit_time);
    assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
    let cooldown = state.dex_stop_loss_cooldowns.get("tok").expect("cooldown armed");
    assert_eq!(cooldown.exit_price, trades[0].exit_price);
    assert_eq!(cooldown.exit_time, trades[0].exit_time);
    let exit_price = cooldown.exit_price; // 0.50 (no slippage)

    // scan at $0.56 (< 0.575 recovery), score 62, 1 minute later: blocked
    let soon = exit_time + Duration::minutes(1);
    let weak = candidate("tok", 0.56, 62.0);
    assert_eq!(
        dex::entry_blocker(&mut state, &weak, soon),
        Some("stop_loss_cooldown")
    );

    // same price, score 72, 6 minutes later: momentum path reopens
    let later = exit_time + Duration::minutes(6);
    let strong = candidate("tok", 0.56, 72.0);
    assert_eq!(dex::entry_blocker(&mut state, &strong, later), None);

    // and full price recovery reopens regardless of momentum
    let recovered = candidate("tok", exit_price * 1.16, 10.0);
    // momentum gate runs before the cooldown gate, so use a passing score
    let recovered = TokenCandidate {
        momentum_score: 65.0,
        ..recovered
    };
    assert_eq!(dex::entry_blocker(&mut state, &recovered, soon), None);
}

// ----------------------------------------------------------------------------
// Scenario 3: circuit breaker trips on 3 stop-losses, early-clears on a
// fresh momentum signal after the minimum cooldown
// ----------------------------------------------------------------------------
#[test]
fn circuit_breaker_trips_and_early_clears() {
    let mut state = paper_state();
    state.config.dex.stop_loss_cooldown_hours = 0.01; // keep cooldowns out of the way
    let start = Utc::now();

    for (i, addr) in ["a", "b", "c"].iter().enumerate() {
        let entry_price = 1.0;
        enter(&mut state, &candidate(addr, entry_price, 75.0));
        let crash = candidate(addr, 0.70, 75.0);
        let t = start + Duration::minutes(i as i64);
        let trades = dex::process_exits(&mut state, &[crash], 200.0, t);
        assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
    }
    let until = state.dex_circuit_breaker_until.expect("breaker armed");
    assert!((until - (start + Duration::minutes(2))).num_minutes() >= 59);

    // 10 minutes in: blocked even for a hot signal
    let hot = candidate("fresh", 1.0, 75.0);
    assert_eq!(
        dex::entry_blocker(&mut state, &hot, start + Duration::minutes(10)),
        Some("circuit_breaker_active")
    );

    // 35 minutes in, scan shows momentum 75 on an unheld token: the engine
    // cycle clears the breaker before entries
    let t = start + Duration::minutes(35);
    let scan = vec![hot.clone()];
    dex::process_exits(&mut state, &scan, 200.0, t); // no positions, no-op
    // early-clear evaluation happens inside the cycle; call the breaker
    // directly the way the cycle does
    let cleared = gambit::dex::breaker::try_early_clear(&mut state, Some(75.0), false, t);
    assert_eq!(cleared, Some("fresh_momentum"));
    assert_eq!(dex::entry_blocker(&mut state, &hot, t), None);
}

// ----------------------------------------------------------------------------
// Scenario 4: crisis escalation liquidates the paper book and blocks buys
// ----------------------------------------------------------------------------
struct FailingBroker;

#[async_trait]
impl Broker for FailingBroker {
    async fn get_account(&self) -> Result<BrokerAccount> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_clock(&self) -> Result<MarketClock> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_asset(&self, _: &str) -> Result<Asset> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_snapshot(&self, _: &str) -> Result<Snapshot> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_crypto_snapshot(&self, _: &str) -> Result<Snapshot> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn create_order(&self, _: &OrderRequest) -> Result<Order> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn close_position(&self, _: &str) -> Result<Order> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_option_expirations(&self, _: &str) -> Result<Vec<NaiveDate>> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_option_chain(&self, _: &str, _: NaiveDate) -> Result<Vec<OptionContract>> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_option_snapshot(&self, _: &str) -> Result<OptionSnapshot> {
        Err(GambitError::Broker("stub".into()))
    }
}

#[tokio::test]
async fn crisis_escalation_liquidates_and_blocks_buys() {
    // VIX 46 (+3) + HY 650 (+2) + BTC -22% weekly (+2) = 7 -> level 3
    let indicators = CrisisIndicators {
        vix: Some(46.0),
        hy_spread: Some(650.0),
        btc_weekly_pct: Some(-22.0),
        ..CrisisIndicators::default()
    };
    let cfg = gambit::config::CrisisConfig::default();
    let (score, _) = gambit::crisis::score_indicators(&indicators, &cfg);
    assert_eq!(score, 7);
    let level = CrisisLevel::from_score(score);
    assert_eq!(level, CrisisLevel::FullCrisis);

    // the level-3 tick liquidates the paper book
    let mut state = paper_state();
    enter(&mut state, &candidate("a", 1.0, 75.0));
    enter(&mut state, &candidate("b", 2.0, 75.0));
    state.crisis_state.level = level;
    let closed = dex::liquidate_all(&mut state, 200.0, Utc::now());
    assert_eq!(closed.len(), 2);
    assert!(state.dex_positions.is_empty());

    // and the next buy is refused before any broker call happens
    let signal = gambit::domain::Signal {
        symbol: "AAPL".to_string(),
        source: gambit::domain::SignalSource::Reddit,
        source_detail: "stocks".to_string(),
        raw_sentiment: 0.9,
        sentiment: 0.8,
        volume: 10,
        freshness: 1.0,
        timestamp: Utc::now(),
        upvotes: None,
        comments: None,
        flair: None,
        subreddits: None,
        is_crypto: None,
        momentum: None,
        price: Some(100.0),
    };
    let broker = FailingBroker;
    let bought = gambit::trader::executor::execute_buy(
        &mut state,
        &broker,
        &signal,
        0.9,
        level.position_multiplier(),
        "test",
        Utc::now(),
    )
    .await
    .unwrap();
    assert!(!bought);
    assert!(state
        .logs
        .iter()
        .any(|l| l.source == "executor.buy_blocked" && l.message.contains("CRISIS_MODE_BLOCKING")));
}

// ----------------------------------------------------------------------------
// Scenario 5: PDT refusal on a sub-$25k account
// ----------------------------------------------------------------------------
struct PdtBroker;

#[async_trait]
impl Broker for PdtBroker {
    async fn get_account(&self) -> Result<BrokerAccount> {
        Ok(BrokerAccount {
            cash: dec!(5000),
            equity: dec!(24000),
            daytrade_count: 3,
        })
    }
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(vec![])
    }
    async fn get_clock(&self) -> Result<MarketClock> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_asset(&self, _: &str) -> Result<Asset> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_snapshot(&self, _: &str) -> Result<Snapshot> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_crypto_snapshot(&self, _: &str) -> Result<Snapshot> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn create_order(&self, _: &OrderRequest) -> Result<Order> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn close_position(&self, _: &str) -> Result<Order> {
        panic!("PDT guard must refuse before the close reaches the broker");
    }
    async fn get_option_expirations(&self, _: &str) -> Result<Vec<NaiveDate>> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_option_chain(&self, _: &str, _: NaiveDate) -> Result<Vec<OptionContract>> {
        Err(GambitError::Broker("stub".into()))
    }
    async fn get_option_snapshot(&self, _: &str) -> Result<OptionSnapshot> {
        Err(GambitError::Broker("stub".into()))
    }
}

#[tokio::test]
async fn pdt_guard_refuses_same_day_sell() {
    let mut state = AgentState::new();
    let now = Utc::now();
    state.position_entries.insert(
        "AAPL".to_string(),
        gambit::domain::PositionEntry {
            symbol: "AAPL".to_string(),
            entry_time: now, // bought today
            entry_price: 100.0,
            entry_sentiment: 0.5,
            entry_social_volume: 10,
            entry_sources: vec![],
            entry_reason: String::new(),
            peak_price: 100.0,
            peak_sentiment: 0.5,
        },
    );

    let broker = PdtBroker;
    let sold = gambit::trader::executor::execute_sell(
        &mut state, &broker, "AAPL", false, "take_profit", now,
    )
    .await
    .unwrap();
    assert!(!sold);
    // position book-keeping untouched
    assert!(state.position_entries.contains_key("AAPL"));
    assert!(state
        .logs
        .iter()
        .any(|l| l.source == "executor.sell_blocked_pdt"));
}

// ----------------------------------------------------------------------------
// Scenario 6: concentration cap reduces an oversized DEX entry
// ----------------------------------------------------------------------------
#[test]
fn concentration_cap_reduces_half_sol_entry_to_forty_pct() {
    let mut state = paper_state();
    state.dex_paper_balance_sol = 1.0;
    state.dex_peak_balance = 1.0;
    state.dex_peak_value = 1.0;
    state.config.dex.pct_of_balance = 0.5; // wants 0.5 SOL

    enter(&mut state, &candidate("tok", 0.01, 75.0));
    let position = &state.dex_positions["tok"];
    assert!((position.entry_stake_sol - 0.4).abs() < 1e-9);
    assert!(state
        .logs
        .iter()
        .any(|l| l.level == LogLevel::Info && l.message.contains("paper_buy_reduced")));
}

// ----------------------------------------------------------------------------
// Invariant sweep after a mixed run
// ----------------------------------------------------------------------------
#[test]
fn invariants_hold_after_mixed_activity() {
    let mut state = AgentState::new();
    state.config.dex.slippage_model = SlippageModel::Realistic;
    let gas = state.config.dex.gas_fee_sol;
    let now = Utc::now();

    let mut legs = 0u32;
    for (addr, entry, exit) in [("a", 1.0, 1.9), ("b", 0.4, 0.3), ("c", 2.0, 1.5)] {
        enter(&mut state, &candidate(addr, entry, 75.0));
        legs += 1;
        let trades = dex::process_exits(&mut state, &[candidate(addr, exit, 75.0)], 200.0, now);
        if !trades.is_empty() {
            legs += 1;
        }
    }
    enter(&mut state, &candidate("open", 1.0, 75.0));
    legs += 1;

    // invariant 1 (conservation)
    let open_stakes: f64 = state.dex_positions.values().map(|p| p.entry_stake_sol).sum();
    let realized: f64 = state.dex_trade_history.iter().map(|t| t.pnl_sol).sum();
    let lhs = open_stakes + state.dex_paper_balance_sol - realized;
    let rhs = state.config.dex.starting_balance_sol - gas * legs as f64;
    assert!((lhs - rhs).abs() < 1e-9);

    // invariant 2 (peak >= entry)
    for position in state.dex_positions.values() {
        assert!(position.peak_price >= position.entry_price);
    }

    // invariant 3 (stop-class exits have a cooldown at the exact exit values)
    for trade in &state.dex_trade_history {
        if trade.exit_reason.arms_cooldown() {
            let cd = state
                .dex_stop_loss_cooldowns
                .get(&trade.token_address)
                .expect("cooldown for stop-class exit");
            assert_eq!(cd.exit_price, trade.exit_price);
            assert_eq!(cd.exit_time, trade.exit_time);
        }
    }

    // invariant 4 (unique token addresses is a map property, but assert
    // symbols line up too)
    let addresses: Vec<&String> = state.dex_positions.keys().collect();
    let mut deduped = addresses.clone();
    deduped.dedup();
    assert_eq!(addresses.len(), deduped.len());

    // metrics only depend on history (invariant from the property list)
    let m1 = gambit::dex::metrics::calculate(&state);
    let m2 = gambit::dex::metrics::calculate(&state);
    assert_eq!(m1, m2);
}

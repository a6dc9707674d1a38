//! External collaborators behind narrow async traits: the broker, the DEX
//! data providers, and the SOL/USD price cache.

pub mod broker;
pub mod dexmon;

pub use broker::{
    AlpacaBroker, Asset, AssetClass, Broker, BrokerAccount, BrokerPosition, MarketClock,
    OptionContract, OptionSnapshot, OptionType, Order, OrderRequest, OrderSide, OrderType,
    Snapshot, TimeInForce,
};
pub use dexmon::{
    ChartAnalysis, DexProvider, DexScreenerProvider, SolPriceCache, TokenCandidate,
};

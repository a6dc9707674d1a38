pub mod adapters;
pub mod agent;
pub mod api;
pub mod config;
pub mod crisis;
pub mod dex;
pub mod domain;
pub mod error;
pub mod llm;
pub mod notify;
pub mod persistence;
pub mod signals;
pub mod state;
pub mod trader;

pub use agent::{AgentDeps, AgentHandle};
pub use config::{AppConfig, TradingConfig};
pub use error::{GambitError, Result};
pub use state::AgentState;

//! The agent actor: one durable state owner, one inbound channel, one tick.

pub mod actor;
pub mod tick;

pub use actor::{spawn, AgentDeps, AgentHandle, AgentMsg};

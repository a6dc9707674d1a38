//! Shared state for the admin HTTP handlers.

use crate::agent::AgentHandle;

#[derive(Clone)]
pub struct ApiState {
    pub agent: AgentHandle,
    pub api_token: String,
    pub kill_switch_secret: String,
}

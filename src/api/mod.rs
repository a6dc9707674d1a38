//! Admin HTTP surface.
//!
//! Mutating routes require `Authorization: Bearer <api_token>` (compared in
//! constant time); the kill switch uses its own secret. Handlers are thin:
//! every command becomes an actor message, so admin mutations serialize with
//! ticks on the same channel.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod state;

use crate::agent::AgentHandle;
use crate::error::{GambitError, Result};
use tracing::info;

pub async fn serve(
    agent: AgentHandle,
    api_token: String,
    kill_switch_secret: String,
    port: u16,
) -> Result<()> {
    let state = state::ApiState {
        agent,
        api_token,
        kill_switch_secret,
    };
    let router = routes::create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("admin API listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(GambitError::Io)?;
    axum::serve(listener, router)
        .await
        .map_err(GambitError::Io)?;
    Ok(())
}

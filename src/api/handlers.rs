//! Admin handlers. Each one translates an HTTP request into an actor
//! message and waits on the oneshot reply — no handler touches agent state
//! directly, so admin work serializes with ticks.

use crate::api::auth;
use crate::api::state::ApiState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::AgentMsg;

type HandlerResult = std::result::Result<Json<Value>, (StatusCode, Json<Value>)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
}

fn require_auth(state: &ApiState, headers: &HeaderMap) -> std::result::Result<(), (StatusCode, Json<Value>)> {
    if auth::authorized(headers, &state.api_token) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

/// GET /status
pub async fn get_status(State(state): State<ApiState>) -> HandlerResult {
    let status = state
        .agent
        .request(AgentMsg::Status)
        .await
        .map_err(internal)?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

fn default_log_limit() -> usize {
    100
}

/// GET /logs?limit=N
pub async fn get_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> HandlerResult {
    let logs = state
        .agent
        .request(|reply| AgentMsg::Logs {
            limit: query.limit.min(500),
            reply,
        })
        .await
        .map_err(internal)?;
    Ok(Json(logs))
}

/// GET /costs
pub async fn get_costs(State(state): State<ApiState>) -> HandlerResult {
    let costs = state
        .agent
        .request(AgentMsg::Costs)
        .await
        .map_err(internal)?;
    Ok(Json(costs))
}

/// GET /signals
pub async fn get_signals(State(state): State<ApiState>) -> HandlerResult {
    let signals = state
        .agent
        .request(AgentMsg::Signals)
        .await
        .map_err(internal)?;
    Ok(Json(signals))
}

/// POST /config — partial merge over the trading config.
pub async fn post_config(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(patch): Json<Value>,
) -> HandlerResult {
    require_auth(&state, &headers)?;
    let result = state
        .agent
        .request(|reply| AgentMsg::MergeConfig { patch, reply })
        .await
        .map_err(internal)?;
    match result {
        Ok(config) => Ok(Json(json!({"ok": true, "config": config}))),
        Err(problems) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": problems})),
        )),
    }
}

/// POST /enable
pub async fn post_enable(State(state): State<ApiState>, headers: HeaderMap) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::Enable)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /disable — also clears the alarm.
pub async fn post_disable(State(state): State<ApiState>, headers: HeaderMap) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::Disable)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /trigger — run one tick synchronously.
pub async fn post_trigger(State(state): State<ApiState>, headers: HeaderMap) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::Trigger)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /kill — separate secret; disables, clears the alarm, clears the
/// signal cache and pre-market plan. Open positions stay open.
pub async fn post_kill(State(state): State<ApiState>, headers: HeaderMap) -> HandlerResult {
    if state.kill_switch_secret.is_empty()
        || !auth::authorized(&headers, &state.kill_switch_secret)
    {
        return Err(unauthorized());
    }
    let reply = state
        .agent
        .request(AgentMsg::Kill)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /dex/reset
pub async fn post_dex_reset(State(state): State<ApiState>, headers: HeaderMap) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::DexReset)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /dex/clear-cooldowns
pub async fn post_dex_clear_cooldowns(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::DexClearCooldowns)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /dex/clear-breaker
pub async fn post_dex_clear_breaker(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::DexClearBreaker)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisToggleBody {
    #[serde(default)]
    pub manual_override: Option<bool>,
    #[serde(default)]
    pub level: Option<u8>,
}

/// POST /crisis/toggle {manualOverride?, level?}
pub async fn post_crisis_toggle(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CrisisToggleBody>,
) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(|reply| AgentMsg::CrisisToggle {
            manual_override: body.manual_override,
            level: body.level,
            reply,
        })
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

/// POST /crisis/check — force an immediate indicator evaluation.
pub async fn post_crisis_check(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> HandlerResult {
    require_auth(&state, &headers)?;
    let reply = state
        .agent
        .request(AgentMsg::CrisisCheck)
        .await
        .map_err(internal)?;
    Ok(Json(reply))
}

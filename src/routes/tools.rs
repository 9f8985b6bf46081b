//! Tool-call Routes
//!
//! The view's calls arrive here after the host has relayed them.
//!
//! Endpoints:
//! - POST /api/v1/tools/call - Run one tool call, returns a tagged result
//! - GET /api/v1/regions?locator=... - Parsed regions for one page

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::proxy::{RegionsResponse, ToolCall, ToolResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/call", post(call_tool))
}

pub fn regions_router() -> Router<AppState> {
    Router::new().route("/", get(get_regions))
}

/// Run a tool call
///
/// Tool failures are results, not HTTP errors: a rejected locator comes
/// back as `200` with `kind: "error"`. Only an unreadable body is a `4xx`.
async fn call_tool(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ToolCall>, JsonRejection>,
) -> Result<Json<ToolResponse>> {
    let Json(call) = payload?;
    tracing::debug!(tool = call.name(), "Tool call");
    Ok(Json(state.facade().dispatch(call).await))
}

#[derive(Debug, Deserialize)]
struct RegionsQuery {
    locator: Option<String>,
}

async fn get_regions(
    State(state): State<AppState>,
    Query(query): Query<RegionsQuery>,
) -> Result<Json<RegionsResponse>> {
    let locator = query
        .locator
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing locator".to_string()))?;
    Ok(Json(state.facade().read_regions(&locator).await?))
}

//! Public API handlers.

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::drinks::DrinkReply;

use super::AppState;
use super::error::{ApiError, drink_error_to_api};

#[derive(Debug, Deserialize)]
pub struct DebugQuery {
    #[serde(default)]
    pub debug: bool,
}

pub async fn banner() -> &'static str {
    "Sorso drinks API is running"
}

pub async fn identify(
    State(state): State<AppState>,
    Query(query): Query<DebugQuery>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let reply = state
        .drinks
        .identify(body, query.debug)
        .await
        .map_err(drink_error_to_api)?;
    Ok(render_reply(reply))
}

pub async fn recipes(
    State(state): State<AppState>,
    Query(query): Query<DebugQuery>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let reply = state
        .drinks
        .recipes(body, query.debug)
        .await
        .map_err(drink_error_to_api)?;
    Ok(render_reply(reply))
}

/// The `{data, timings}` envelope is selected by the caller's debug flag,
/// never inferred from the payload shape.
fn render_reply(reply: DrinkReply) -> Response {
    match reply.timings {
        Some(timings) => Json(json!({"data": reply.data, "timings": timings})).into_response(),
        None => Json(reply.data).into_response(),
    }
}

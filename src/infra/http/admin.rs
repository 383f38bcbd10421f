//! Administrative cache endpoints.
//!
//! Guarded by a shared key in the `x-admin-key` header. With no key
//! configured the routes always refuse; key comparison is constant-time.

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;

use super::AppState;
use super::error::{ApiError, cache_query_error_to_api};

const ADMIN_KEY_HEADER: &str = "x-admin-key";

const DEFAULT_ENDPOINT: &str = "recipes";
const DEFAULT_BROWSE_LIMIT: i64 = 50;
const MAX_BROWSE_LIMIT: i64 = 100;

pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_key.as_deref() else {
        return ApiError::forbidden().into_response();
    };

    let supplied = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if expected.as_bytes().ct_eq(supplied.as_bytes()).unwrap_u8() == 0 {
        return ApiError::forbidden().into_response();
    }

    next.run(request).await
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub endpoint: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /admin/cache` — most recent entries for one endpoint.
pub async fn browse_cache(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let endpoint = query
        .endpoint
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let limit = query
        .limit
        .unwrap_or(DEFAULT_BROWSE_LIMIT)
        .clamp(1, MAX_BROWSE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let entries = state
        .cache
        .browse(&endpoint, limit, offset)
        .await
        .map_err(cache_query_error_to_api)?;

    Ok(Json(json!({"data": entries})))
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub body: Value,
}

/// `POST /admin/cache/lookup` — point lookup by endpoint and request body.
pub async fn lookup_cache(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<Response, ApiError> {
    let endpoint = request
        .endpoint
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    let found = state
        .cache
        .lookup(&endpoint, &request.body)
        .await
        .map_err(cache_query_error_to_api)?;

    Ok(match found {
        Some(result) => Json(json!({"found": true, "result": result})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"found": false}))).into_response(),
    })
}

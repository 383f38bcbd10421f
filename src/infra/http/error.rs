use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::drinks::{CompletionError, DrinkError};
use crate::application::error::ErrorReport;
use crate::cache::PrimaryQueryError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const FORBIDDEN: &str = "forbidden";
    pub const AI_BAD_REQUEST: &str = "ai_bad_request";
    pub const AI_UNAUTHORIZED: &str = "ai_unauthorized";
    pub const AI_RATE_LIMITED: &str = "ai_rate_limited";
    pub const AI_TIMEOUT: &str = "ai_timeout";
    pub const AI_MALFORMED: &str = "ai_malformed";
    pub const AI_UNREACHABLE: &str = "ai_unreachable";
    pub const CACHE_UNAVAILABLE: &str = "cache_unavailable";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn invalid_input(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Request could not be processed",
            Some(hint.into()),
        )
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "Admin key required",
            None,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so the logging middleware can emit rich
        // diagnostics.
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

pub fn drink_error_to_api(error: DrinkError) -> ApiError {
    match error {
        DrinkError::InvalidRequest(detail) => ApiError::invalid_input(detail),
        DrinkError::Completion(completion) => completion_error_to_api(completion),
        DrinkError::UnusableCompletion(domain) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::AI_MALFORMED,
            "Completion service answered in an unexpected shape",
            Some(domain.to_string()),
        ),
    }
}

fn completion_error_to_api(error: CompletionError) -> ApiError {
    match error {
        CompletionError::InvalidRequest => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::AI_BAD_REQUEST,
            "Completion service rejected the request",
            None,
        ),
        CompletionError::BadCredentials => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::AI_UNAUTHORIZED,
            "Completion service refused the configured credentials",
            None,
        ),
        CompletionError::RateLimited => ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::AI_RATE_LIMITED,
            "Completion service rate limit exceeded",
            Some("Retry later".to_string()),
        ),
        CompletionError::Timeout => ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            codes::AI_TIMEOUT,
            "Completion request timed out",
            None,
        ),
        CompletionError::MalformedCompletion { preview } => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::AI_MALFORMED,
            "Completion text did not contain valid JSON",
            Some(preview),
        ),
        CompletionError::Transport { message } => ApiError::new(
            StatusCode::BAD_GATEWAY,
            codes::AI_UNREACHABLE,
            "Completion service is unreachable",
            Some(message),
        ),
    }
}

pub fn cache_query_error_to_api(error: PrimaryQueryError) -> ApiError {
    match error {
        PrimaryQueryError::NotConfigured => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CACHE_UNAVAILABLE,
            "Primary cache store is not configured",
            None,
        ),
        PrimaryQueryError::Store(store) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::CACHE_UNAVAILABLE,
            "Primary cache store could not be queried",
            Some(store.to_string()),
        ),
    }
}

mod admin;
mod error;
mod handlers;
mod middleware;

pub use error::{ApiError, codes};

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::drinks::DrinkService;
use crate::cache::ResultCache;

#[derive(Clone)]
pub struct AppState {
    pub drinks: Arc<DrinkService>,
    pub cache: ResultCache,
    pub admin_key: Option<Arc<str>>,
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/cache", get(admin::browse_cache))
        .route("/admin/cache/lookup", post(admin::lookup_cache))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin::admin_auth,
        ));

    Router::new()
        .route("/", get(handlers::banner))
        .route("/api/identify", post(handlers::identify))
        .route("/api/recipes", post(handlers::recipes))
        .merge(admin_routes)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .with_state(state)
}

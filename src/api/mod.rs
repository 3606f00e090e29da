pub mod auth;
pub mod error;
pub mod rate_limit;
mod tours;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;
use error::ApiError;

/// JSON bodies are small; anything bigger than 10 KiB is noise.
const BODY_LIMIT_BYTES: usize = 10 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let tour_routes = Router::new()
        .route("/top-5-cheap", get(tours::top_five_cheap))
        .route("/tour-stats", get(tours::tour_stats))
        .route("/", get(tours::list_tours).post(tours::create_tour))
        .route(
            "/:id",
            get(tours::get_tour)
                .patch(tours::update_tour)
                .delete(tours::delete_tour),
        );

    let user_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password/:token", patch(auth::reset_password));

    // The whole /api surface sits behind the rate limiter
    let api_routes = Router::new()
        .nest("/tours", tour_routes)
        .nest("/users", user_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .fallback(unknown_route)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn unknown_route(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {} not found on this server", uri.path()))
}

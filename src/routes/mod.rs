use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod brands;
pub mod diecasts;
pub mod health;
pub mod search;
pub mod upload;

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        warn!(origin = %value, error = %err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    let diecast_routes = Router::new()
        .route(
            "/",
            get(diecasts::list_diecasts).post(diecasts::create_diecast),
        )
        .route(
            "/:id",
            get(diecasts::get_diecast)
                .put(diecasts::update_diecast)
                .delete(diecasts::delete_diecast),
        );

    let upload_routes = Router::new()
        .route("/", post(upload::upload_image))
        .layer(DefaultBodyLimit::max(upload::UPLOAD_BODY_LIMIT));

    Router::new()
        .nest("/api/diecasts", diecast_routes)
        .nest("/api/upload", upload_routes)
        .route("/api/search", get(search::search_diecasts))
        .route("/api/brands", get(brands::list_brands))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

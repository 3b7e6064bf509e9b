//! Top-level router assembly, grounded on the teacher's `dog_axum::app`
//! `layer_defaults` pattern: every route gets the request-id middleware and
//! `TraceLayer::new_for_http()`, plus CORS driven by `CorsOrigins` (spec
//! §12).

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, export, health, media, result, status, upload};
use crate::middleware::ensure_request_id;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        .route("/upload", post(upload::upload))
        .route("/status/{job_id}", get(status::get_status))
        .route("/result/{job_id}", get(result::get_result))
        .route("/media/{job_id}", get(media::get_media))
        .route("/export/{job_id}", post(export::export))
        .route("/admin/retry/{job_id}", post(admin::retry))
        .route("/healthz", get(health::healthz))
        .with_state(state)
        .layer(axum::middleware::from_fn(ensure_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.config.cors_origins();
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
}

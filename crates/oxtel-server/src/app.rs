use crate::state::AppState;
use crate::{api, logging, middleware as mw};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

/// Builds the HTTP app. Layer order matters: requests pass the logger,
/// then signature validation (over the raw body), then decryption, then
/// decompression before reaching a handler; responses unwind through
/// compression and are signed last, so the signature covers the wire bytes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::list_all))
        .route("/ping", get(api::ping))
        .route("/update/", post(api::update_from_json))
        .route("/update/{kind}/{name}/{value}", post(api::update_from_path))
        .route("/updates/", post(api::update_batch_json))
        .route("/value/", post(api::value_from_json))
        .route("/value/{kind}/{name}", get(api::value_from_path))
        .layer(middleware::from_fn(mw::compression_layer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::decrypt_layer,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::signing_layer,
        ))
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}

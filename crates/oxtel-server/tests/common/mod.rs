#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use oxtel_server::app;
use oxtel_server::audit::AuditPublisher;
use oxtel_server::service::MetricsService;
use oxtel_server::state::AppState;
use oxtel_storage::memory::MemStorage;
use rsa::RsaPrivateKey;
use std::sync::Arc;
use tower::util::ServiceExt;

pub fn test_state(signing_key: Option<&str>, private_key: Option<RsaPrivateKey>) -> AppState {
    AppState {
        service: Arc::new(MetricsService::new(Arc::new(MemStorage::new()))),
        audit: Arc::new(AuditPublisher::new()),
        signing_key: signing_key.map(|key| Arc::new(key.to_string())),
        private_key: private_key.map(Arc::new),
    }
}

pub fn build_app(signing_key: Option<&str>, private_key: Option<RsaPrivateKey>) -> Router {
    app::build_router(test_state(signing_key, private_key))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("router never fails")
}

pub async fn send_json(app: &Router, uri: &str, json: &str) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .expect("request builds");
    send(app, request).await
}

pub async fn post(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request builds");
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request builds");
    send(app, request).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads")
        .to_vec()
}

pub async fn body_string(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

use crate::logging::ClientIp;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use oxtel_common::types::{AuditEvent, Metric};
use oxtel_storage::StorageError;
use std::collections::BTreeMap;

/// POST /update/{kind}/{name}/{value}
pub async fn update_from_path(
    State(state): State<AppState>,
    Extension(client_ip): Extension<ClientIp>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    if let Err(err) = state.service.update_from_params(&kind, &name, &value).await {
        return write_error(&err, "failed to update metric");
    }
    notify_audit(&state, vec![name], client_ip);
    plain_ok()
}

/// POST /update/ with a single JSON metric.
pub async fn update_from_json(
    State(state): State<AppState>,
    Extension(client_ip): Extension<ClientIp>,
    Json(metric): Json<Metric>,
) -> Response {
    if metric.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing required metric fields").into_response();
    }
    if let Err(err) = state.service.update_one(&metric).await {
        return write_error(&err, "failed to update metric");
    }
    notify_audit(&state, vec![metric.id], client_ip);
    plain_ok()
}

/// POST /updates/ with a JSON array of metrics.
pub async fn update_batch_json(
    State(state): State<AppState>,
    Extension(client_ip): Extension<ClientIp>,
    Json(metrics): Json<Vec<Metric>>,
) -> Response {
    if metrics.iter().any(|m| m.id.is_empty()) {
        return (StatusCode::BAD_REQUEST, "missing required metric fields").into_response();
    }
    if let Err(err) = state.service.update_batch(&metrics).await {
        return write_error(&err, "failed to update metrics");
    }
    notify_audit(
        &state,
        metrics.into_iter().map(|m| m.id).collect(),
        client_ip,
    );
    plain_ok()
}

/// GET /value/{kind}/{name}
pub async fn value_from_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    match state.service.value_string(&kind, &name).await {
        Ok(value) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            value,
        )
            .into_response(),
        Err(err) => write_error(&err, "failed to get metric"),
    }
}

/// POST /value/ with a partial JSON metric (id + kind), answered with the
/// metric populated from storage.
pub async fn value_from_json(
    State(state): State<AppState>,
    Json(metric): Json<Metric>,
) -> Response {
    if metric.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing required metric fields").into_response();
    }
    match state.service.populate(metric).await {
        Ok(populated) => Json(populated).into_response(),
        Err(err) => write_error(&err, "failed to get metric"),
    }
}

/// GET / — HTML listing of every metric, sorted by name.
pub async fn list_all(State(state): State<AppState>) -> Response {
    match state.service.list_all().await {
        Ok(list) => Html(render_listing(&list)).into_response(),
        Err(err) => write_error(&err, "failed to get metrics"),
    }
}

/// GET /ping — storage health check; 501 when the backend has none.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.service.ping().await {
        Ok(()) => plain_ok(),
        Err(err) => write_error(&err, "storage health check failed"),
    }
}

fn render_listing(list: &BTreeMap<String, String>) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"UTF-8\">\n    \
         <title>Metrics</title>\n</head>\n<body>\n    <h1>Metrics</h1>\n    <ul>\n",
    );
    for (name, value) in list {
        page.push_str(&format!("        <li>{name}: {value}</li>\n"));
    }
    page.push_str("    </ul>\n</body>\n</html>\n");
    page
}

fn plain_ok() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "",
    )
        .into_response()
}

/// Maps storage errors to wire responses. Sentinel texts are stable; only
/// the catch-all case logs at error level.
fn write_error(err: &StorageError, internal_message: &str) -> Response {
    match err {
        StorageError::Cancelled => {
            // client went away; nothing useful to write
            tracing::debug!("request cancelled by client");
            ().into_response()
        }
        StorageError::DeadlineExceeded => status_text(StatusCode::GATEWAY_TIMEOUT),
        StorageError::Metric(metric_err) => {
            (StatusCode::BAD_REQUEST, metric_err.to_string()).into_response()
        }
        StorageError::NotFound => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
        StorageError::PingUnsupported => {
            (StatusCode::NOT_IMPLEMENTED, err.to_string()).into_response()
        }
        _ => {
            tracing::error!(error = %err, "{internal_message}");
            status_text(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn status_text(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

/// Fire-and-forget audit notification after a successful mutation.
fn notify_audit(state: &AppState, metric_names: Vec<String>, ClientIp(ip): ClientIp) {
    if !state.audit.has_observers() {
        return;
    }
    let event = AuditEvent::new(metric_names, ip);
    let publisher = state.audit.clone();
    tokio::spawn(async move {
        publisher.notify_all(event).await;
    });
}

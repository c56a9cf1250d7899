//! Wire-level middleware: HMAC validation/signing, payload decryption and
//! gzip handling.
//!
//! Agents build the body as json → gzip → RSA → HMAC, so the server peels
//! the layers in reverse: the signature is checked against the raw (still
//! encrypted) body, then the body is decrypted, then inflated. Responses
//! flow the other way: the compression layer runs before the signing layer,
//! so the signature always covers the bytes that go on the wire.

use crate::state::AppState;
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use oxtel_common::{crypto, gzip, sign};

static HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");

/// Validates `HashSHA256` on requests that carry it and signs every
/// response body. Skipped entirely when no signing key is configured.
pub async fn signing_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = state.signing_key.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
    };

    if let Some(received) = parts.headers.get(&HASH_HEADER).and_then(|v| v.to_str().ok()) {
        if !sign::verify(&bytes, &key, received) {
            return (StatusCode::BAD_REQUEST, "invalid signature").into_response();
        }
    }

    let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        tracing::error!("failed to buffer response body for signing");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if let Ok(value) = HeaderValue::from_str(&sign::sign(&bytes, &key)) {
        parts.headers.insert(HASH_HEADER.clone(), value);
    }
    Response::from_parts(parts, Body::from(bytes))
}

/// Decrypts the request body when a private key is installed. An empty body
/// passes through untouched.
pub async fn decrypt_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(private_key) = state.private_key.clone() else {
        return next.run(req).await;
    };

    let (mut parts, body) = req.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
    };

    let bytes = if bytes.is_empty() {
        bytes
    } else {
        match crypto::decrypt(&private_key, &bytes) {
            Ok(plain) => {
                parts.headers.remove(header::CONTENT_LENGTH);
                Bytes::from(plain)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to decrypt request body");
                return (StatusCode::BAD_REQUEST, "failed to decrypt request body")
                    .into_response();
            }
        }
    };

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Inflates gzip request bodies and compresses responses for clients that
/// accept gzip. The response decision is deferred until the final content
/// type is known: only successful JSON or HTML bodies are compressed.
pub async fn compression_layer(req: Request, next: Next) -> Response {
    let accepts_gzip = header_contains(&req, header::ACCEPT_ENCODING, "gzip");

    let req = if header_contains(&req, header::CONTENT_ENCODING, "gzip") {
        let (mut parts, body) = req.into_parts();
        let Ok(bytes) = to_bytes(body, usize::MAX).await else {
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        };
        match gzip::decompress(&bytes) {
            Ok(plain) => {
                parts.headers.remove(header::CONTENT_ENCODING);
                parts.headers.remove(header::CONTENT_LENGTH);
                Request::from_parts(parts, Body::from(plain))
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode gzip request body");
                return (StatusCode::BAD_REQUEST, "failed to decode gzip body").into_response();
            }
        }
    } else {
        req
    };

    let response = next.run(req).await;
    if !accepts_gzip || !compressible(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, usize::MAX).await else {
        tracing::error!("failed to buffer response body for compression");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    match gzip::compress(&bytes) {
        Ok(packed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(packed))
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to compress response body");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

fn compressible(response: &Response) -> bool {
    if response.status().as_u16() >= 300 {
        return false;
    }
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    content_type.contains("application/json") || content_type.contains("text/html")
}

fn header_contains(req: &Request, name: header::HeaderName, token: &str) -> bool {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains(token))
        .unwrap_or(false)
}

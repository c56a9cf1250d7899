mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_bytes, body_string, build_app, get, post, send, send_json};
use oxtel_common::types::Metric;
use oxtel_common::{crypto, gzip, sign};
use rsa::{RsaPrivateKey, RsaPublicKey};

#[tokio::test]
async fn gauge_update_via_url_and_readback() {
    let app = build_app(None, None);

    let response = post(&app, "/update/gauge/temperature/23.5").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/value/gauge/temperature").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "23.5");
}

#[tokio::test]
async fn counter_accumulates_across_updates() {
    let app = build_app(None, None);

    assert_eq!(
        post(&app, "/update/counter/requests/5").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        post(&app, "/update/counter/requests/7").await.status(),
        StatusCode::OK
    );

    let response = get(&app, "/value/counter/requests").await;
    assert_eq!(body_string(response).await, "12");
}

#[tokio::test]
async fn json_batch_applies_in_order() {
    let app = build_app(None, None);

    let batch = r#"[
        {"id":"a","type":"gauge","value":1.0},
        {"id":"a","type":"gauge","value":2.0},
        {"id":"b","type":"counter","delta":3}
    ]"#;
    let response = send_json(&app, "/updates/", batch).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(body_string(get(&app, "/value/gauge/a").await).await, "2");
    assert_eq!(body_string(get(&app, "/value/counter/b").await).await, "3");
}

#[tokio::test]
async fn empty_batch_is_accepted() {
    let app = build_app(None, None);
    let response = send_json(&app, "/updates/", "[]").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_metric_returns_404_with_sentinel_text() {
    let app = build_app(None, None);
    let response = get(&app, "/value/gauge/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, "metric not found");
}

#[tokio::test]
async fn unknown_kind_returns_400_with_sentinel_text() {
    let app = build_app(None, None);
    let response = post(&app, "/update/weird/x/1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "unsupported metric type");
}

#[tokio::test]
async fn unparseable_value_returns_400() {
    let app = build_app(None, None);
    let response = post(&app, "/update/gauge/x/abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "invalid metric value");

    // counters reject fractional input
    let response = post(&app, "/update/counter/x/1.5").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ping_without_database_backing_is_not_implemented() {
    let app = build_app(None, None);
    let response = get(&app, "/ping").await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn json_endpoints_reject_non_json_content() {
    let app = build_app(None, None);
    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"id":"g","type":"gauge","value":1.0}"#))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn json_update_requires_an_id() {
    let app = build_app(None, None);
    let response = send_json(&app, "/update/", r#"{"id":"","type":"gauge","value":1.0}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_update_requires_the_kind_appropriate_field() {
    let app = build_app(None, None);
    let response = send_json(&app, "/update/", r#"{"id":"g","type":"gauge"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "missing gauge value");
}

#[tokio::test]
async fn json_value_populates_the_stored_metric() {
    let app = build_app(None, None);
    send_json(&app, "/update/", r#"{"id":"g","type":"gauge","value":4.25}"#).await;

    let response = send_json(&app, "/value/", r#"{"id":"g","type":"gauge"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    let metric: Metric = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(metric.value, Some(4.25));
    assert_eq!(metric.delta, None);
}

#[tokio::test]
async fn listing_page_is_html_sorted_by_name() {
    let app = build_app(None, None);
    post(&app, "/update/gauge/zeta/1.5").await;
    post(&app, "/update/counter/alpha/2").await;

    let response = get(&app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/html"));

    let page = body_string(response).await;
    assert!(page.contains("alpha: 2"));
    assert!(page.contains("zeta: 1.5"));
    assert!(page.find("alpha").unwrap() < page.find("zeta").unwrap());
}

#[tokio::test]
async fn gzip_request_bodies_are_inflated() {
    let app = build_app(None, None);

    let batch = r#"[{"id":"packed","type":"counter","delta":9}]"#;
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(gzip::compress(batch.as_bytes()).unwrap()))
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::OK);

    assert_eq!(
        body_string(get(&app, "/value/counter/packed").await).await,
        "9"
    );
}

#[tokio::test]
async fn malformed_gzip_body_is_a_client_error() {
    let app = build_app(None, None);
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from("not gzip at all"))
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_responses_are_compressed_when_the_client_accepts_gzip() {
    let app = build_app(None, None);
    send_json(&app, "/update/", r#"{"id":"g","type":"gauge","value":1.0}"#).await;

    let request = Request::builder()
        .method("POST")
        .uri("/value/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::from(r#"{"id":"g","type":"gauge"}"#))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_ENCODING).unwrap(),
        "gzip"
    );

    let inflated = gzip::decompress(&body_bytes(response).await).unwrap();
    let metric: Metric = serde_json::from_slice(&inflated).unwrap();
    assert_eq!(metric.value, Some(1.0));
}

#[tokio::test]
async fn plain_text_responses_are_never_compressed() {
    let app = build_app(None, None);
    post(&app, "/update/gauge/g/1.0").await;

    let request = Request::builder()
        .method("GET")
        .uri("/value/gauge/g")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    assert_eq!(body_string(response).await, "1");
}

#[tokio::test]
async fn corrupted_signature_is_rejected() {
    let app = build_app(Some("secret"), None);

    let body = r#"[{"id":"c","type":"counter","delta":1}]"#;
    let mut signature = sign::sign(body.as_bytes(), "secret");
    signature.replace_range(0..1, if &signature[0..1] == "0" { "1" } else { "0" });

    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", signature)
        .body(Body::from(body))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "invalid signature");
}

#[tokio::test]
async fn valid_signature_is_accepted_and_response_is_signed() {
    let app = build_app(Some("secret"), None);

    let body = r#"[{"id":"c","type":"counter","delta":4}]"#;
    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", sign::sign(body.as_bytes(), "secret"))
        .body(Body::from(body))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_signature = response
        .headers()
        .get("HashSHA256")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let response_body = body_bytes(response).await;
    assert!(sign::verify(&response_body, "secret", &response_signature));
}

#[tokio::test]
async fn unsigned_requests_pass_when_no_header_is_present() {
    // validation only triggers on requests that carry the header
    let app = build_app(Some("secret"), None);
    let response = post(&app, "/update/gauge/g/1.0").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn encrypted_signed_gzip_report_is_ingested() {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public_key = RsaPublicKey::from(&private_key);
    let app = build_app(Some("secret"), Some(private_key));

    // agent-side pipeline: json -> gzip -> rsa -> hmac over the wire bytes
    let batch = serde_json::to_vec(&vec![
        Metric::gauge("Alloc", 2048.0),
        Metric::counter("PollCount", 7),
    ])
    .unwrap();
    let body = crypto::encrypt(&public_key, &gzip::compress(&batch).unwrap()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .header("HashSHA256", sign::sign(&body, "secret"))
        .body(Body::from(body))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        body_string(get(&app, "/value/gauge/Alloc").await).await,
        "2048"
    );
    assert_eq!(
        body_string(get(&app, "/value/counter/PollCount").await).await,
        "7"
    );
}

#[tokio::test]
async fn empty_body_passes_through_decryption() {
    // a private key is installed but GET requests carry no body
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let app = build_app(None, Some(private_key));
    let response = get(&app, "/value/gauge/absent").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

//! End-to-end capture tests against an in-process HTTP server.

use super::{capturing_client, single_transaction};
use http_capture::capture::client::CANCELLED_ERROR;
use http_capture::config::CaptureConfig;
use http_capture::models::TransactionState;
use http_capture::policy::REDACTION_MASK;
use http_capture::storage::{PersistenceGateway, TransactionQuery};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_successful_call_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/test"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Response-Header", "RespValue")
                .set_body_raw(r#"{"created":true}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());
    let url = format!("{}/api/test?param=value", server.uri());
    let response = client
        .send(
            client
                .inner()
                .post(&url)
                .header("Authorization", "Bearer secret-token")
                .header("Content-Type", "application/json")
                .body(r#"{"name":"widget"}"#),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"created":true}"#);

    let tx = single_transaction(&gateway, &client).await;
    assert_eq!(tx.state(), TransactionState::Complete);
    assert_eq!(tx.request.method, "POST");
    assert_eq!(tx.request.host, "127.0.0.1");
    assert_eq!(tx.request.path, "/api/test");
    assert!(!tx.request.is_ssl);

    let auth = tx
        .request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("authorization"))
        .unwrap();
    assert_eq!(auth.value, REDACTION_MASK);
    assert!(tx
        .request
        .headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case("content-type") && h.value == "application/json"));
    assert_eq!(
        tx.request.body.as_ref().unwrap().content.as_deref(),
        Some(r#"{"name":"widget"}"#)
    );

    assert!(tx.error().is_none());
    let response = tx.response().unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.status_message, "OK");
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
    assert_eq!(response.protocol, "HTTP/1.1");
    assert!(response
        .headers
        .iter()
        .any(|h| h.name.eq_ignore_ascii_case("response-header") && h.value == "RespValue"));
    assert_eq!(
        response.body.as_ref().unwrap().content.as_deref(),
        Some(r#"{"created":true}"#)
    );
}

#[tokio::test]
async fn test_large_request_body_is_forwarded_in_full() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = CaptureConfig {
        max_content_length: 250_000,
        ..Default::default()
    };
    let (gateway, client) = capturing_client(config, reqwest::Client::new());
    let payload = vec![b'z'; 1_000_000];

    let response = client
        .send(
            client
                .inner()
                .put(format!("{}/upload", server.uri()))
                .body(payload.clone()),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    drop(response);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, payload);

    let tx = single_transaction(&gateway, &client).await;
    let body = tx.request.body.unwrap();
    assert_eq!(body.captured_size, 250_000);
    assert_eq!(body.total_size, 1_000_000);
    assert!(body.is_truncated());
}

#[tokio::test]
async fn test_large_response_body_is_truncated_for_storage_only() {
    let server = MockServer::start().await;
    let body = "a".repeat(40_000);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "text/plain"))
        .mount(&server)
        .await;

    let config = CaptureConfig {
        max_content_length: 1_000,
        ..Default::default()
    };
    let (gateway, client) = capturing_client(config, reqwest::Client::new());
    let response = client.send(client.inner().get(server.uri())).await.unwrap();
    assert_eq!(response.text().await.unwrap(), body);

    let tx = single_transaction(&gateway, &client).await;
    let snapshot = tx.response().unwrap().body.clone().unwrap();
    assert_eq!(snapshot.captured_size, 1_000);
    assert_eq!(snapshot.total_size, 40_000);
    assert_eq!(snapshot.content.unwrap().len(), 1_000);
}

#[tokio::test]
async fn test_unsupported_encoding_records_size_only() {
    let server = MockServer::start().await;
    let raw = vec![0x1b, 0x03, 0x00, 0xf8, 0xa5, 0x40, 0x02];
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "br")
                .set_body_bytes(raw.clone()),
        )
        .mount(&server)
        .await;

    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());
    let response = client.send(client.inner().get(server.uri())).await.unwrap();
    assert_eq!(response.bytes().await.unwrap().to_vec(), raw);

    let tx = single_transaction(&gateway, &client).await;
    let snapshot = tx.response().unwrap().body.clone().unwrap();
    assert!(snapshot.content.is_none());
    assert_eq!(snapshot.total_size, raw.len() as u64);
}

#[tokio::test]
async fn test_unread_response_completes_on_drop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());
    let response = client.send(client.inner().get(server.uri())).await.unwrap();
    assert_eq!(response.status(), 404);
    drop(response);

    let tx = single_transaction(&gateway, &client).await;
    assert_eq!(tx.state(), TransactionState::Complete);
    let recorded = tx.response().unwrap();
    assert_eq!(recorded.status_code, 404);
    assert_eq!(recorded.status_message, "Not Found");
    assert!(recorded.body.is_none());
}

#[tokio::test]
async fn test_connection_failure_is_recorded_and_returned() {
    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());

    let err = client
        .send(client.inner().get("http://127.0.0.1:1/unreachable"))
        .await
        .unwrap_err();
    assert!(err.is_connect());

    let tx = single_transaction(&gateway, &client).await;
    assert_eq!(tx.state(), TransactionState::Failed);
    assert!(tx.error().unwrap().starts_with("Connection failed"));
    assert!(tx.response().is_none());
    assert_eq!(tx.request.path, "/unreachable");
}

#[tokio::test]
async fn test_transport_timeout_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let (gateway, client) = capturing_client(CaptureConfig::default(), http);

    let err = client.send(client.inner().get(server.uri())).await.unwrap_err();
    assert!(err.is_timeout());

    let tx = single_transaction(&gateway, &client).await;
    assert!(tx.error().unwrap().starts_with("Request timed out"));
}

#[tokio::test]
async fn test_cancelled_call_is_recorded_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());
    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        client.send(client.inner().get(server.uri())),
    )
    .await;
    assert!(outcome.is_err());

    let tx = single_transaction(&gateway, &client).await;
    assert_eq!(tx.state(), TransactionState::Failed);
    assert_eq!(tx.error(), Some(CANCELLED_ERROR));
}

#[tokio::test]
async fn test_skipped_host_is_called_but_not_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("X-Trace", "1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = CaptureConfig {
        skip_hosts: vec!["127.0.0.1".to_string()],
        ..Default::default()
    };
    let (gateway, client) = capturing_client(config, reqwest::Client::new());
    let response = client
        .send(client.inner().get(server.uri()).header("X-Trace", "1"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    drop(response);

    client.adapter().flush().await.unwrap();
    assert_eq!(gateway.count().unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_each_resolve() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());
    let calls = (0..16).map(|i| {
        let client = client.clone();
        let url = format!("{}/item/{}", server.uri(), i);
        tokio::spawn(async move {
            let response = client.send(client.inner().get(url)).await.unwrap();
            response.text().await.unwrap()
        })
    });
    for call in calls.collect::<Vec<_>>() {
        assert_eq!(call.await.unwrap(), "ok");
    }

    client.adapter().flush().await.unwrap();
    let all = gateway.query(&TransactionQuery::default()).unwrap();
    assert_eq!(all.len(), 16);
    assert!(all.iter().all(|tx| tx.state() == TransactionState::Complete));
}

/// `{"compressed":true}` gzip-compressed.
const GZIP_BODY: [u8; 39] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xab, 0x56, 0x4a, 0xce, 0xcf,
    0x2d, 0x28, 0x4a, 0x2d, 0x2e, 0x4e, 0x4d, 0x51, 0xb2, 0x2a, 0x29, 0x2a, 0x4d, 0xad, 0x05,
    0x00, 0xf1, 0xea, 0x39, 0x95, 0x13, 0x00, 0x00, 0x00,
];

async fn gzip_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_raw(GZIP_BODY.to_vec(), "application/json"),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_gzip_response_is_decoded_before_capture() {
    let server = gzip_server().await;
    let (gateway, client) = capturing_client(CaptureConfig::default(), reqwest::Client::new());

    let response = client.send(client.inner().get(server.uri())).await.unwrap();
    assert_eq!(response.text().await.unwrap(), r#"{"compressed":true}"#);

    let tx = single_transaction(&gateway, &client).await;
    let snapshot = tx.response().unwrap().body.clone().unwrap();
    assert_eq!(snapshot.content.as_deref(), Some(r#"{"compressed":true}"#));
    assert_eq!(snapshot.total_size, 19);
}

#[tokio::test]
async fn test_no_gzip_client_records_size_only() {
    let server = gzip_server().await;
    let http = reqwest::Client::builder().no_gzip().build().unwrap();
    let (gateway, client) = capturing_client(CaptureConfig::default(), http);

    let response = client.send(client.inner().get(server.uri())).await.unwrap();
    assert_eq!(response.bytes().await.unwrap().to_vec(), GZIP_BODY.to_vec());

    let tx = single_transaction(&gateway, &client).await;
    let snapshot = tx.response().unwrap().body.clone().unwrap();
    assert!(snapshot.content.is_none());
    assert_eq!(snapshot.total_size, GZIP_BODY.len() as u64);
}

//! Capture over a persistence gateway whose writes always fail.

use super::init_test_env;
use chrono::{DateTime, Utc};
use http_capture::capture::{CaptureAdapter, CapturingClient};
use http_capture::config::CaptureConfig;
use http_capture::models::{Outcome, Transaction, TransactionId};
use http_capture::storage::{MemoryConfigStore, PersistenceGateway, StorageError, TransactionQuery};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Gateway that rejects every write and counts the attempts.
#[derive(Default)]
struct BrokenDiskGateway {
    writes: AtomicUsize,
}

impl BrokenDiskGateway {
    fn fail<T>(&self) -> Result<T, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            "disk gone",
        )))
    }
}

impl PersistenceGateway for BrokenDiskGateway {
    fn insert(&self, _: &Transaction) -> Result<TransactionId, StorageError> {
        self.fail()
    }
    fn update(&self, _: TransactionId, _: &Outcome) -> Result<(), StorageError> {
        self.fail()
    }
    fn get(&self, _: TransactionId) -> Result<Option<Transaction>, StorageError> {
        Ok(None)
    }
    fn delete(&self, _: TransactionId) -> Result<bool, StorageError> {
        Ok(false)
    }
    fn delete_older_than(&self, _: DateTime<Utc>) -> Result<usize, StorageError> {
        self.fail()
    }
    fn delete_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
    fn query(&self, _: &TransactionQuery) -> Result<Vec<Transaction>, StorageError> {
        Ok(Vec::new())
    }
    fn count(&self) -> Result<usize, StorageError> {
        Ok(0)
    }
}

fn broken_client() -> (Arc<BrokenDiskGateway>, CapturingClient) {
    init_test_env();
    let gateway = Arc::new(BrokenDiskGateway::default());
    let adapter = CaptureAdapter::new(
        CaptureConfig::default(),
        gateway.clone(),
        Arc::new(MemoryConfigStore::new()),
    )
    .unwrap();
    (
        gateway,
        CapturingClient::new(reqwest::Client::new(), Arc::new(adapter)),
    )
}

#[tokio::test]
async fn test_storage_failure_never_fails_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(2)
        .mount(&server)
        .await;

    let (gateway, client) = broken_client();
    for _ in 0..2 {
        let response = client
            .send(
                client
                    .inner()
                    .post(format!("{}/orders", server.uri()))
                    .body("{}"),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.text().await.unwrap(), "created");
    }

    client.adapter().flush().await.unwrap();
    // The sweep and both inserts were attempted; updates of unstored
    // transactions are skipped.
    assert!(gateway.writes.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_storage_failure_keeps_transport_errors_verbatim() {
    let (_gateway, client) = broken_client();

    let err = client
        .send(client.inner().get("http://127.0.0.1:1/unreachable"))
        .await
        .unwrap_err();
    assert!(err.is_connect());

    client.adapter().flush().await.unwrap();
    client.adapter().shutdown().await;
}

//! Retention and durability tests over the file-backed stores.

use super::init_test_env;
use chrono::{DateTime, Duration, Utc};
use http_capture::capture::{CaptureAdapter, CapturingClient};
use http_capture::config::CaptureConfig;
use http_capture::models::{RequestFacet, Transaction, TransactionState};
use http_capture::retention::{RetentionManager, RetentionPeriod, SweepOutcome, LAST_CLEANUP_KEY};
use http_capture::storage::{
    ConfigStore, FileConfigStore, JournalStore, PersistenceGateway, TransactionQuery,
};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pending(path: &str, requested_at: DateTime<Utc>) -> Transaction {
    Transaction::begin(RequestFacet {
        method: "GET".to_string(),
        url: format!("https://api.example.com{}", path),
        host: "api.example.com".to_string(),
        path: path.to_string(),
        scheme: "https".to_string(),
        is_ssl: true,
        headers: Vec::new(),
        body: None,
        requested_at,
    })
}

#[test]
fn test_sweep_persists_across_reopen() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("transactions.jsonl");
    let settings_path = dir.path().join("settings.json");
    let now = Utc::now();

    {
        let gateway = Arc::new(JournalStore::open(&journal_path).unwrap());
        let store = Arc::new(FileConfigStore::open(&settings_path).unwrap());
        gateway.insert(&pending("/old", now - Duration::days(3))).unwrap();
        gateway.insert(&pending("/recent", now - Duration::hours(2))).unwrap();
        gateway.insert(&pending("/fresh", now)).unwrap();

        let manager = RetentionManager::new(gateway.clone(), store);
        assert_eq!(
            manager.maintain(RetentionPeriod::OneDay, now).unwrap(),
            SweepOutcome::Swept(1)
        );
    }

    let gateway = Arc::new(JournalStore::open(&journal_path).unwrap());
    let store = Arc::new(FileConfigStore::open(&settings_path).unwrap());
    assert_eq!(store.get_long(LAST_CLEANUP_KEY, 0), now.timestamp_millis());

    let paths: Vec<String> = gateway
        .query(&TransactionQuery::default())
        .unwrap()
        .into_iter()
        .map(|tx| tx.request.path)
        .collect();
    assert_eq!(paths, vec!["/fresh", "/recent"]);

    // The durable watermark debounces the next sweep.
    let manager = RetentionManager::new(gateway.clone(), store);
    assert_eq!(
        manager
            .maintain(RetentionPeriod::OneDay, now + Duration::hours(1))
            .unwrap(),
        SweepOutcome::Skipped
    );
    assert_eq!(gateway.count().unwrap(), 2);
}

#[test]
fn test_one_hour_boundary() {
    init_test_env();
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(JournalStore::open(dir.path().join("tx.jsonl")).unwrap());
    let store = Arc::new(FileConfigStore::open(dir.path().join("settings.json")).unwrap());
    let manager = RetentionManager::new(gateway.clone(), store.clone());
    let now = Utc::now();

    store
        .put_long(LAST_CLEANUP_KEY, now.timestamp_millis() - 60_000)
        .unwrap();
    assert_eq!(
        manager.maintain(RetentionPeriod::OneHour, now).unwrap(),
        SweepOutcome::Skipped
    );
    assert_eq!(
        store.get_long(LAST_CLEANUP_KEY, 0),
        now.timestamp_millis() - 60_000
    );

    store
        .put_long(LAST_CLEANUP_KEY, now.timestamp_millis() - 3_600_000)
        .unwrap();
    assert!(matches!(
        manager.maintain(RetentionPeriod::OneHour, now).unwrap(),
        SweepOutcome::Swept(_)
    ));
    assert_eq!(store.get_long(LAST_CLEANUP_KEY, 0), now.timestamp_millis());
}

#[tokio::test]
async fn test_captured_calls_survive_restart() {
    init_test_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(201).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("capture").join("transactions.jsonl");
    let settings_path = dir.path().join("capture").join("settings.json");

    {
        let adapter = CaptureAdapter::new(
            CaptureConfig::default(),
            Arc::new(JournalStore::open(&journal_path).unwrap()),
            Arc::new(FileConfigStore::open(&settings_path).unwrap()),
        )
        .unwrap();
        let client = CapturingClient::new(reqwest::Client::new(), Arc::new(adapter));

        let response = client
            .send(client.inner().get(format!("{}/widgets", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "{}");
        client.adapter().shutdown().await;
    }

    let gateway = JournalStore::open(&journal_path).unwrap();
    let stored = gateway.query(&TransactionQuery::default()).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].state(), TransactionState::Complete);
    assert_eq!(stored[0].request.path, "/widgets");
    assert_eq!(stored[0].response().unwrap().status_code, 201);

    // The first call established the retention watermark.
    let store = FileConfigStore::open(&settings_path).unwrap();
    assert!(store.get_long(LAST_CLEANUP_KEY, 0) > 0);
}

//! Wildberries client behavior against a mock API
//!
//! Covers retry classification on the wire (429 with Retry-After, 5xx
//! backoff, fatal 4xx) and a full token-cursor drive of the card listing.

use async_trait::async_trait;
use msync_common::{Result, SyncError};
use msync_core::pagination::{BatchSink, PageCursor, PageDriver};
use msync_ingest::config::WbConfig;
use msync_ingest::wildberries::cards::CardsFetcher;
use msync_ingest::wildberries::models::WbCard;
use msync_ingest::wildberries::WbClient;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> WbConfig {
    WbConfig {
        token: Some("test-token".into()),
        stats_url: server.uri(),
        content_url: server.uri(),
        analytics_url: server.uri(),
        cards_limit: 2,
        pagination_delay_ms: 0,
        cards_pagination_delay_ms: 0,
        cards_batch_delay_ms: 0,
        rate_limit_wait_secs: 0,
        report_poll_interval_secs: 0,
        ..Default::default()
    }
}

fn order_json(srid: &str, date: &str) -> serde_json::Value {
    json!({
        "srid": srid,
        "gNumber": "g-1",
        "date": date,
        "lastChangeDate": date,
        "supplierArticle": "ART-1",
        "totalPrice": 990.0,
        "isCancel": false,
        "nmId": 100
    })
}

#[tokio::test]
async fn orders_request_carries_token_and_parses_moscow_dates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .and(header("Authorization", "test-token"))
        .and(query_param("flag", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            order_json("s-1", "2024-06-01T12:00:00"),
            order_json("s-2", "2024-06-01T13:30:00"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = WbClient::new(&test_config(&server)).unwrap();
    let orders = client.fetch_orders(chrono::Utc::now()).await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].srid, "s-1");
    // 12:00 Moscow == 09:00 UTC
    assert_eq!(
        orders[0].date,
        chrono::DateTime::parse_from_rfc3339("2024-06-01T09:00:00Z").unwrap()
    );
}

#[tokio::test]
async fn rate_limit_response_is_retried_after_the_advertised_wait() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("Retry-After", "0"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = WbClient::new(&test_config(&server)).unwrap();
    let orders = client.fetch_orders(chrono::Utc::now()).await.unwrap();

    assert!(orders.is_empty());
}

#[tokio::test]
async fn server_errors_back_off_then_recover() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([order_json("s-9", "2024-06-02T10:00:00")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = WbClient::new(&test_config(&server)).unwrap();
    let orders = client.fetch_orders(chrono::Utc::now()).await.unwrap();

    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn client_errors_fail_immediately_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_string("wrong dateFrom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = WbClient::new(&test_config(&server)).unwrap();
    let result = client.fetch_orders(chrono::Utc::now()).await;

    match result {
        Err(SyncError::Request { status: 400, body }) => {
            assert!(body.contains("wrong dateFrom"));
        },
        other => panic!("expected fatal request error, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_retries_surface_as_retries_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/supplier/orders"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let client = WbClient::new(&test_config(&server)).unwrap();
    let result = client.fetch_orders(chrono::Utc::now()).await;

    assert!(matches!(
        result,
        Err(SyncError::RetriesExhausted { attempts: 3 })
    ));
}

struct CollectingSink {
    cards: Vec<WbCard>,
    cursors: Vec<PageCursor>,
}

#[async_trait]
impl BatchSink<WbCard> for CollectingSink {
    async fn apply(&mut self, records: Vec<WbCard>, cursor: &PageCursor) -> Result<()> {
        self.cards.extend(records);
        self.cursors.push(cursor.clone());
        Ok(())
    }
}

fn card_json(nm_id: i64) -> serde_json::Value {
    json!({
        "nmID": nm_id,
        "vendorCode": format!("VC-{nm_id}"),
        "brand": "acme",
        "title": "widget",
        "updatedAt": "2024-06-01T10:00:00Z"
    })
}

#[tokio::test]
async fn card_listing_drains_through_the_server_cursor() {
    let server = MockServer::start().await;

    // Continuation request: echoes the cursor of the first page.
    Mock::given(method("POST"))
        .and(path("/content/v2/get/cards/list"))
        .and(body_partial_json(json!({
            "settings": { "cursor": { "updatedAt": "2024-06-01T10:00:00Z", "nmID": 2 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cards": [card_json(3)],
            "cursor": { "updatedAt": "2024-06-02T10:00:00Z", "nmID": 3, "total": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    // First request: no cursor fields.
    Mock::given(method("POST"))
        .and(path("/content/v2/get/cards/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cards": [card_json(1), card_json(2)],
            "cursor": { "updatedAt": "2024-06-01T10:00:00Z", "nmID": 2, "total": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = WbClient::new(&test_config(&server)).unwrap();
    let driver = PageDriver::new(2, Duration::ZERO);
    let mut fetcher = CardsFetcher {
        client: &client,
        limit: 2,
    };
    let mut sink = CollectingSink {
        cards: Vec::new(),
        cursors: Vec::new(),
    };

    let stats = driver
        .drain_all(PageCursor::Token { last_id: None }, &mut fetcher, &mut sink)
        .await
        .unwrap();

    assert_eq!(stats.page_count, 2);
    assert_eq!(stats.total_records, 3);
    assert_eq!(sink.cards.len(), 3);
    assert_eq!(sink.cards[2].nm_id, 3);

    // Every delivered batch carries the already-advanced cursor token.
    assert_eq!(
        sink.cursors[0],
        PageCursor::Token {
            last_id: Some("2024-06-01T10:00:00Z|2".into())
        }
    );
}

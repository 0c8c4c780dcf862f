//! Integration test: full server against a stub provider
//!
//! Provider stub -> publisher -> embedded broker -> raw subscriber, with
//! the HTTP data endpoint read over real loopback HTTP.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tickcast_broker::{ConnectOptions, Packet, Role, connect, next_packet, subscribe};
use tickcast_clock::SystemClock;
use tickcast_core::{Notification, NotificationKind, PRICES_TOPIC, PricesResponse};
use tickcast_runner::{NO_DATA_YET, RunningServer, ServerConfig, ServerError, start};

const QUOTES_PATH: &str = "/v1/cryptocurrency/quotes/latest";

fn listing(symbol: &str, price: f64) -> Value {
    json!({
        "id": 1,
        "name": format!("{} coin", symbol),
        "symbol": symbol,
        "quote": {"USD": {
            "price": price,
            "volume_24h": 1000.0,
            "percent_change_1h": 0.1,
            "percent_change_24h": 0.2,
            "percent_change_7d": 0.3,
            "market_cap": 5000.0,
            "last_updated": "2024-05-01T12:00:00.000Z"
        }}
    })
}

/// CoinMarketCap stand-in; answers 500 while `down` is set
async fn spawn_provider(down: Arc<AtomicBool>) -> String {
    let router = Router::new().route(
        QUOTES_PATH,
        get(move |Query(q): Query<HashMap<String, String>>| {
            let down = down.clone();
            async move {
                if down.load(Ordering::SeqCst) {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"status": {"error_code": 500, "error_message": "boom"}})),
                    );
                }
                let mut data = serde_json::Map::new();
                for sym in q.get("symbol").map(String::as_str).unwrap_or("").split(',') {
                    data.insert(sym.to_string(), listing(sym, 100.5));
                }
                (
                    StatusCode::OK,
                    Json(json!({"status": {"error_code": 0, "error_message": null}, "data": data})),
                )
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

fn config(provider_url: &str) -> ServerConfig {
    let env: HashMap<&str, String> = HashMap::from([
        ("CMC_API_KEY", "test-key".to_string()),
        ("CMC_BASE_URL", provider_url.to_string()),
        ("BROKER_HOST", "127.0.0.1".to_string()),
        ("BROKER_PORT", "0".to_string()),
        ("HTTP_HOST", "127.0.0.1".to_string()),
        ("HTTP_PORT", "0".to_string()),
        ("UPDATE_INTERVAL_SECONDS", "3600".to_string()),
        ("TRACKED_SYMBOLS", "BTC,ETH".to_string()),
        ("PROVIDER_TIMEOUT_SECONDS", "2".to_string()),
    ]);
    ServerConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn get_json(server: &RunningServer, path: &str) -> (u16, Value) {
    let url = format!("http://{}{}", server.http_addr(), path);
    let resp = reqwest::get(&url).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_startup_fetch_serves_prices_and_notifies() {
    let _ = env_logger::try_init();
    let provider = spawn_provider(Arc::new(AtomicBool::new(false))).await;
    let shutdown = CancellationToken::new();
    let server = start(config(&provider), Arc::new(SystemClock::new()), shutdown.clone())
        .await
        .unwrap();

    // The first tick fires at startup
    let publisher = server.publisher().clone();
    wait_until(|| publisher.stats().published == 1).await;

    let (status, body) = get_json(&server, "/api/crypto-prices").await;
    assert_eq!(status, 200);
    let prices: PricesResponse = serde_json::from_value(body).unwrap();
    assert!(prices.success);
    assert!(!prices.cached);
    assert_eq!(prices.data.len(), 2);
    assert_eq!(prices.data[0].price, dec!(100.5));

    let (_, health) = get_json(&server, "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["has_data"], true);
    assert_eq!(health["publisher"]["published"], 1);
    assert_eq!(health["publisher"]["state"], "idle");
    assert_eq!(health["broker"]["connections"], 0);

    // Subscribers only see what is published after they subscribe
    let broker_addr = server.broker_addr().unwrap().to_string();
    let (mut conn, _) = connect(&broker_addr, &ConnectOptions::new(Role::Subscriber, "it-sub"))
        .await
        .unwrap();
    subscribe(&mut conn, 1, &[PRICES_TOPIC.to_string()], Duration::from_secs(2))
        .await
        .unwrap();

    assert!(server.publisher().run_cycle().await.is_published());
    let packet = timeout(Duration::from_secs(3), next_packet(&mut conn))
        .await
        .unwrap()
        .unwrap();
    let (topic, payload) = match packet {
        Packet::Publish { topic, payload, .. } => (topic, payload),
        other => panic!("expected PUBLISH, got {:?}", other),
    };
    assert_eq!(topic, PRICES_TOPIC);
    let notification: Notification = serde_json::from_slice(&payload).unwrap();
    assert_eq!(notification.kind, NotificationKind::UpdateAvailable);
    assert_eq!(notification.sequence, 2);

    let (_, health) = get_json(&server, "/health").await;
    assert_eq!(health["broker"]["connections"], 1);

    shutdown.cancel();
    timeout(Duration::from_secs(5), server.join()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_provider_down_reports_no_data() {
    let _ = env_logger::try_init();
    let down = Arc::new(AtomicBool::new(true));
    let provider = spawn_provider(down.clone()).await;
    let shutdown = CancellationToken::new();
    let server = start(config(&provider), Arc::new(SystemClock::new()), shutdown.clone())
        .await
        .unwrap();

    let publisher = server.publisher().clone();
    wait_until(|| publisher.stats().failed == 1).await;

    let (status, body) = get_json(&server, "/api/crypto-prices").await;
    assert_eq!(status, 503);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], NO_DATA_YET);

    let (_, health) = get_json(&server, "/health").await;
    assert_eq!(health["has_data"], false);
    assert_eq!(health["publisher"]["failed"], 1);

    // Recovery on the next cycle
    down.store(false, Ordering::SeqCst);
    assert!(server.publisher().run_cycle().await.is_published());
    let (status, body) = get_json(&server, "/api/crypto-prices").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    shutdown.cancel();
    timeout(Duration::from_secs(5), server.join()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_refresh_serves_cached_with_error() {
    let _ = env_logger::try_init();
    let down = Arc::new(AtomicBool::new(false));
    let provider = spawn_provider(down.clone()).await;
    let shutdown = CancellationToken::new();
    let server = start(config(&provider), Arc::new(SystemClock::new()), shutdown.clone())
        .await
        .unwrap();

    let publisher = server.publisher().clone();
    wait_until(|| publisher.stats().published == 1).await;

    // Well inside the staleness window, but the refresh just failed
    down.store(true, Ordering::SeqCst);
    assert!(!server.publisher().run_cycle().await.is_published());

    let (status, body) = get_json(&server, "/api/crypto-prices").await;
    assert_eq!(status, 200);
    let prices: PricesResponse = serde_json::from_value(body).unwrap();
    assert!(prices.success);
    assert!(prices.cached);
    assert!(prices.error.unwrap().starts_with("refresh failed"));
    assert_eq!(prices.data.len(), 2);

    down.store(false, Ordering::SeqCst);
    assert!(server.publisher().run_cycle().await.is_published());
    let (_, body) = get_json(&server, "/api/crypto-prices").await;
    assert_eq!(body["cached"], false);
    assert!(body["error"].is_null());

    shutdown.cancel();
    timeout(Duration::from_secs(5), server.join()).await.unwrap();
}

#[tokio::test]
async fn test_http_port_in_use_fails_startup() {
    let _ = env_logger::try_init();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = config("http://127.0.0.1:9");
    config.http_port = taken.local_addr().unwrap().port();

    let shutdown = CancellationToken::new();
    let err = match start(config, Arc::new(SystemClock::new()), shutdown.clone()).await {
        Ok(_) => panic!("startup should fail while the port is taken"),
        Err(e) => e,
    };
    assert!(matches!(err, ServerError::HttpBind { .. }), "got {:?}", err);
    shutdown.cancel();
}

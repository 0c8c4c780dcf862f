//! Integration test: CoinMarketCap client against a local stub server
//!
//! Covers status-code mapping, the API key header, and rejection of
//! incomplete responses over real HTTP.

use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderMap, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
    routing::get,
};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tickcast_clock::SystemClock;
use tickcast_core::Symbol;
use tickcast_gateway::{ApiKey, CoinMarketCapClient, ProviderConfig};
use tickcast_ports::{FetchError, PriceProvider};

const KEY: &str = "test-key-123";
const PATH: &str = "/v1/cryptocurrency/quotes/latest";

async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, timeout: Duration) -> CoinMarketCapClient {
    let config = ProviderConfig::new(ApiKey::new(KEY))
        .with_base_url(base_url)
        .with_timeout(timeout);
    CoinMarketCapClient::new(config, Arc::new(SystemClock::new())).unwrap()
}

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

/// Stub that answers with the requested symbols, minus any listed in `drop`
fn quotes_router(drop: &'static [&'static str]) -> Router {
    Router::new().route(
        PATH,
        get(
            move |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                if headers.get("X-CMC_PRO_API_KEY").and_then(|v| v.to_str().ok()) != Some(KEY) {
                    return (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"status": {"error_code": 1001, "error_message": "This API Key is invalid."}})),
                    );
                }
                assert_eq!(q.get("convert").map(String::as_str), Some("USD"));
                let mut data = serde_json::Map::new();
                for sym in q.get("symbol").map(String::as_str).unwrap_or("").split(',') {
                    if !drop.contains(&sym) {
                        data.insert(sym.to_string(), listing(sym, 100.5));
                    }
                }
                (
                    StatusCode::OK,
                    Json(json!({"status": {"error_code": 0, "error_message": null}, "data": data})),
                )
            },
        ),
    )
}

fn symbols(raw: &str) -> Vec<Symbol> {
    Symbol::parse_list(raw).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_exactly_requested_symbols() {
    let _ = env_logger::try_init();
    let base = spawn_stub(quotes_router(&[])).await;
    let provider = client(&base, Duration::from_secs(5));

    let snap = provider.fetch_prices(&symbols("btc,ETH,sol")).await.unwrap();
    let got: Vec<&str> = snap.symbols().map(Symbol::as_str).collect();
    assert_eq!(got, vec!["BTC", "ETH", "SOL"]);
    assert_eq!(snap.get("ETH").unwrap().price, dec!(100.5));
}

#[tokio::test]
async fn test_duplicate_symbols_requested_once() {
    let _ = env_logger::try_init();
    let base = spawn_stub(quotes_router(&[])).await;
    let provider = client(&base, Duration::from_secs(5));

    let requested = vec![
        Symbol::new("BTC").unwrap(),
        Symbol::new("ETH").unwrap(),
        Symbol::new("BTC").unwrap(),
    ];
    let snap = provider.fetch_prices(&requested).await.unwrap();
    let got: Vec<&str> = snap.symbols().map(Symbol::as_str).collect();
    assert_eq!(got, vec!["BTC", "ETH"]);
}

#[tokio::test]
async fn test_partial_upstream_response_is_incomplete() {
    let _ = env_logger::try_init();
    let base = spawn_stub(quotes_router(&["SOL"])).await;
    let provider = client(&base, Duration::from_secs(5));

    let err = provider.fetch_prices(&symbols("BTC,SOL")).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Incomplete {
            missing: vec!["SOL".into()]
        }
    );
}

#[tokio::test]
async fn test_bad_key_is_unauthorized() {
    let _ = env_logger::try_init();
    let base = spawn_stub(quotes_router(&[])).await;
    let config = ProviderConfig::new(ApiKey::new("wrong"))
        .with_base_url(&base)
        .with_timeout(Duration::from_secs(5));
    let provider = CoinMarketCapClient::new(config, Arc::new(SystemClock::new())).unwrap();

    let err = provider.fetch_prices(&symbols("BTC")).await.unwrap_err();
    assert_eq!(err, FetchError::Unauthorized("This API Key is invalid.".into()));
}

#[tokio::test]
async fn test_throttling_is_rate_limited() {
    let _ = env_logger::try_init();
    let router = Router::new().route(
        PATH,
        get(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, "60")],
                Json(json!({"status": {"error_code": 1008, "error_message": "minute limit"}})),
            )
                .into_response()
        }),
    );
    let base = spawn_stub(router).await;
    let provider = client(&base, Duration::from_secs(5));

    let err = provider.fetch_prices(&symbols("BTC")).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::RateLimited {
            retry_after_secs: Some(60)
        }
    );
}

#[tokio::test]
async fn test_unreachable_and_slow_upstream_are_network_errors() {
    let _ = env_logger::try_init();

    // Nothing listens on the freed port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let err = client(&dead, Duration::from_secs(2))
        .fetch_prices(&symbols("BTC"))
        .await
        .unwrap_err();
    assert_eq!(err.class(), "network");

    let slow = Router::new().route(
        PATH,
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "{}"
        }),
    );
    let base = spawn_stub(slow).await;
    let err = client(&base, Duration::from_millis(200))
        .fetch_prices(&symbols("BTC"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let _ = env_logger::try_init();
    let router = Router::new().route(PATH, get(|| async { "<html>maintenance</html>" }));
    let base = spawn_stub(router).await;

    let err = client(&base, Duration::from_secs(5))
        .fetch_prices(&symbols("BTC"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)));
}

#[tokio::test]
async fn test_empty_symbol_set_is_rejected_without_network() {
    let provider = client("http://127.0.0.1:1", Duration::from_secs(1));
    let err = provider.fetch_prices(&[]).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidRequest(_)));
}

//! Exported C functions
//!
//! The client is created on the first call from [`ClientSettings::from_env`]
//! and lives for the rest of the process. If creation fails the call
//! returns an error document and the next call tries again.

use log::{debug, error, info};
use parking_lot::Mutex;
use std::ffi::{CStr, c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::sync::{Arc, OnceLock};

use tickcast_core::{HistoricalSeries, PricesResponse};
use tickcast_ports::HistorySource;
use tickcast_subscriber::{
    ClientError, HttpDataClient, PriceClient, SubscriberConfig, UpdateEvent,
};

use crate::buffer::OwnedBuffer;
use crate::settings::ClientSettings;

/// Host callback. Invoked on the library's dispatch thread with a null
/// context whenever new prices are available or the connection recovered.
pub type PriceUpdateCallback = extern "C" fn(context: *const c_void);

static CLIENT: OnceLock<PriceClient> = OnceLock::new();
static INIT: Mutex<()> = Mutex::new(());

fn client() -> Result<&'static PriceClient, String> {
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }
    let _guard = INIT.lock();
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }

    let settings = ClientSettings::from_env();
    let _ = env_logger::Builder::new()
        .filter_level(settings.log_level)
        .try_init();

    let client = build_client(&settings).map_err(|e| {
        error!("Client initialisation failed: {}", e);
        format!("client initialisation failed: {}", e)
    })?;
    info!(
        "Client ready (broker {}, data {})",
        settings.broker_addr, settings.data_url
    );
    Ok(CLIENT.get_or_init(|| client))
}

pub(crate) fn build_client(settings: &ClientSettings) -> Result<PriceClient, ClientError> {
    let http = Arc::new(HttpDataClient::new(&settings.data_url, settings.request_timeout)?);
    let history: Arc<dyn HistorySource> = http.clone();

    let mut config = SubscriberConfig::new(&settings.broker_addr);
    config.request_timeout = settings.request_timeout;
    PriceClient::start(config, http, Some(history))
}

/// Run `body` without letting a panic cross the C boundary
fn guarded(name: &str, body: impl FnOnce() -> String, on_panic: impl FnOnce() -> String) -> OwnedBuffer {
    let json = catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
        error!("{}: internal panic", name);
        on_panic()
    });
    OwnedBuffer::from_string(json)
}

/// Copy a borrowed C string argument. Nothing is kept past the call.
unsafe fn borrowed_str(ptr: *const c_char, what: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("{} is null", what));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_string)
        .map_err(|_| format!("{} is not valid UTF-8", what))
}

pub(crate) fn crypto_data(client: &PriceClient) -> String {
    client.prices_response().to_json()
}

pub(crate) fn historical_data(
    client: &PriceClient,
    symbol: Result<String, String>,
    timeframe: Result<String, String>,
) -> String {
    match (symbol, timeframe) {
        (Ok(symbol), Ok(timeframe)) => client.historical(&symbol, &timeframe).to_json(),
        (Err(e), _) | (_, Err(e)) => HistoricalSeries::failure(None, None, e).to_json(),
    }
}

pub(crate) fn install_callback(client: &PriceClient, callback: Option<PriceUpdateCallback>) {
    match callback {
        Some(callback) => {
            client.register_callback(move |event: &UpdateEvent| {
                debug!("Notifying host: {:?}", event);
                callback(ptr::null());
            });
            info!("Price update callback registered");
        }
        None => {
            client.clear_callback();
            info!("Price update callback cleared");
        }
    }
}

/// Current prices as a JSON `PricesResponse`.
///
/// Ownership of the returned buffer passes to the caller, who must hand it
/// to `release_buffer` exactly once.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_crypto_data() -> OwnedBuffer {
    guarded(
        "fetch_crypto_data",
        || match client() {
            Ok(client) => crypto_data(client),
            Err(e) => PricesResponse::failure(e).to_json(),
        },
        || PricesResponse::failure("internal error").to_json(),
    )
}

/// Historical series as a JSON `HistoricalSeries`.
///
/// Both arguments are borrowed for the duration of the call only. The
/// returned buffer must be released with `release_buffer`.
///
/// # Safety
/// Each argument must be null or point to a NUL-terminated string that
/// stays valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fetch_historical_data(
    symbol: *const c_char,
    timeframe: *const c_char,
) -> OwnedBuffer {
    let symbol = unsafe { borrowed_str(symbol, "symbol") };
    let timeframe = unsafe { borrowed_str(timeframe, "timeframe") };

    guarded(
        "fetch_historical_data",
        || match client() {
            Ok(client) => historical_data(client, symbol, timeframe),
            Err(e) => HistoricalSeries::failure(None, None, e).to_json(),
        },
        || HistoricalSeries::failure(None, None, "internal error").to_json(),
    )
}

/// Register the price update callback, replacing any previous one.
/// Passing NULL clears it. Safe to call from any thread.
#[unsafe(no_mangle)]
pub extern "C" fn register_price_update_callback(callback: Option<PriceUpdateCallback>) {
    let result = catch_unwind(|| match client() {
        Ok(client) => install_callback(client, callback),
        Err(e) => error!("register_price_update_callback: {}", e),
    });
    if result.is_err() {
        error!("register_price_update_callback: internal panic");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{release_buffer, tracker};
    use axum::routing::get;
    use axum::{Json, Router};
    use bytes::Bytes;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tickcast_broker::{Broker, BrokerConfig, BrokerHandle};
    use tickcast_clock::SystemClock;
    use tickcast_core::{Notification, PRICES_TOPIC, PriceSnapshot, Quote, Symbol};
    use tickcast_subscriber::ConnectionState;
    use tokio::runtime::Runtime;
    use tokio_util::sync::CancellationToken;

    fn snapshot() -> PriceSnapshot {
        let quote = Quote {
            symbol: Symbol::new("BTC").unwrap(),
            name: "Bitcoin".into(),
            price: dec!(67000.12),
            percent_change_1h: dec!(0.1),
            percent_change_24h: dec!(2.5),
            percent_change_7d: dec!(-1.2),
            market_cap: dec!(1320000000000),
            volume_24h: dec!(28000000000),
            last_updated: Utc::now(),
        };
        PriceSnapshot::from_quotes(vec![quote], Utc::now()).unwrap()
    }

    async fn prices() -> Json<PricesResponse> {
        Json(PricesResponse::from_snapshot(&snapshot(), Utc::now(), chrono::Duration::minutes(30)))
    }

    struct Backend {
        rt: Runtime,
        broker: BrokerHandle,
        settings: ClientSettings,
        shutdown: CancellationToken,
    }

    impl Backend {
        fn start() -> Self {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let shutdown = CancellationToken::new();
            let broker = rt
                .block_on(Broker::start(
                    BrokerConfig::local(0),
                    Arc::new(SystemClock::new()),
                    shutdown.clone(),
                ))
                .unwrap();

            let listener = rt
                .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
                .unwrap();
            let data_url = format!("http://{}", listener.local_addr().unwrap());
            let app = Router::new().route("/api/crypto-prices", get(prices));
            rt.spawn(async move {
                let _ = axum::serve(listener, app).await;
            });

            let settings = ClientSettings {
                broker_addr: broker.local_addr().to_string(),
                data_url,
                request_timeout: Duration::from_secs(2),
                ..Default::default()
            };
            Self {
                broker: broker.handle(),
                rt,
                settings,
                shutdown,
            }
        }
    }

    impl Drop for Backend {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    fn read(buffer: OwnedBuffer) -> serde_json::Value {
        let text = unsafe { buffer.as_str() }.unwrap().to_string();
        unsafe { release_buffer(buffer) };
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_crypto_data_buffer_round_trip() {
        let backend = Backend::start();
        let client = build_client(&backend.settings).unwrap();

        let json = read(OwnedBuffer::from_string(crypto_data(&client)));
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0]["symbol"], "BTC");
        assert_eq!(json["data"][0]["price"], 67000.12);
        assert_eq!(tracker::live(), 0);
        assert_eq!(tracker::violations(), 0);
    }

    #[test]
    fn test_historical_rejects_bad_arguments_without_network() {
        let backend = Backend::start();
        let client = build_client(&backend.settings).unwrap();

        let null = unsafe { borrowed_str(ptr::null(), "symbol") };
        let json = read(OwnedBuffer::from_string(historical_data(
            &client,
            null,
            Ok("24h".into()),
        )));
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "symbol is null");

        let invalid = [0xFFu8, 0xFE, 0x00];
        let bad_utf8 = unsafe { borrowed_str(invalid.as_ptr() as *const c_char, "timeframe") };
        let json = read(OwnedBuffer::from_string(historical_data(
            &client,
            Ok("BTC".into()),
            bad_utf8,
        )));
        assert_eq!(json["error"], "timeframe is not valid UTF-8");

        let json = read(OwnedBuffer::from_string(historical_data(
            &client,
            Ok("BTC".into()),
            Ok("2w".into()),
        )));
        assert_eq!(json["success"], false);
        assert_eq!(json["symbol"], "BTC");
        assert_eq!(tracker::live(), 0);
    }

    #[test]
    fn test_borrowed_str_copies_input() {
        let owned = CString::new("eth").unwrap();
        let copied = unsafe { borrowed_str(owned.as_ptr(), "symbol") }.unwrap();
        drop(owned);
        assert_eq!(copied, "eth");
    }

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn on_update(context: *const c_void) {
        assert!(context.is_null());
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_callback_fires_per_notification_and_clears() {
        let backend = Backend::start();
        let client = build_client(&backend.settings).unwrap();
        assert!(client.wait_for_state(ConnectionState::Connected, Duration::from_secs(5)));

        install_callback(&client, Some(on_update));
        let body = serde_json::to_vec(&Notification::marker(1, &snapshot())).unwrap();
        let delivered = backend
            .rt
            .block_on(backend.broker.publish(PRICES_TOPIC, Bytes::from(body.clone())))
            .unwrap();
        assert_eq!(delivered, 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while CALLS.load(Ordering::SeqCst) < 1 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        install_callback(&client, None);
        backend
            .rt
            .block_on(backend.broker.publish(PRICES_TOPIC, Bytes::from(body)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}

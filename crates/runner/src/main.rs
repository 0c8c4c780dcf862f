use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tickcast_clock::SystemClock;
use tickcast_runner::{ServerConfig, logging, server};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()));
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_level);

    let shutdown = CancellationToken::new();
    let running = match server::start(config, Arc::new(SystemClock::new()), shutdown.clone()).await {
        Ok(running) => running,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
    shutdown.cancel();
    running.join().await;
    ExitCode::SUCCESS
}

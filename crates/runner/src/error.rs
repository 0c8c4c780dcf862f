use thiserror::Error;

use tickcast_broker::BrokerError;
use tickcast_gateway::RestError;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Provider client error: {0}")]
    Provider(#[from] RestError),

    #[error("Failed to bind HTTP endpoint on {addr}: {source}")]
    HttpBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

//! Error types for the gateway crate

use thiserror::Error;
use tickcast_ports::FetchError;

/// Upstream error codes for an invalid or missing API key
const API_KEY_CODES: [i64; 2] = [1001, 1002];
/// Upstream error codes for minute/daily/monthly/IP rate limits
const RATE_LIMIT_CODES: [i64; 4] = [1008, 1009, 1010, 1011];

/// Infrastructure-level errors from the REST client
#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("API error: {code} - {message}")]
    Api { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convert infrastructure RestError to domain FetchError
impl From<RestError> for FetchError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Http(e) if e.is_timeout() => FetchError::Network(format!("timed out: {}", e)),
            RestError::Http(e) => FetchError::Network(e.to_string()),
            RestError::Status {
                status: 429,
                retry_after_secs,
                ..
            } => FetchError::RateLimited { retry_after_secs },
            RestError::Status {
                status: 401 | 403,
                message,
                ..
            } => FetchError::Unauthorized(message),
            RestError::Status {
                status, message, ..
            } => FetchError::Network(format!("HTTP {}: {}", status, message)),
            RestError::Api { code, message } if API_KEY_CODES.contains(&code) => {
                FetchError::Unauthorized(message)
            }
            RestError::Api { code, .. } if RATE_LIMIT_CODES.contains(&code) => {
                FetchError::RateLimited {
                    retry_after_secs: None,
                }
            }
            RestError::Api { code, message } => {
                FetchError::Network(format!("provider error {}: {}", code, message))
            }
            RestError::Parse(msg) => FetchError::Malformed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> RestError {
        RestError::Status {
            status,
            message: "x".into(),
            retry_after_secs: Some(60),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FetchError::from(status(429)),
            FetchError::RateLimited {
                retry_after_secs: Some(60)
            }
        );
        assert!(matches!(FetchError::from(status(401)), FetchError::Unauthorized(_)));
        assert!(matches!(FetchError::from(status(403)), FetchError::Unauthorized(_)));
        assert!(matches!(FetchError::from(status(502)), FetchError::Network(_)));
    }

    #[test]
    fn test_api_code_mapping() {
        let key = RestError::Api {
            code: 1002,
            message: "API key missing.".into(),
        };
        assert!(matches!(FetchError::from(key), FetchError::Unauthorized(_)));

        let limited = RestError::Api {
            code: 1008,
            message: "minute limit".into(),
        };
        assert!(matches!(
            FetchError::from(limited),
            FetchError::RateLimited { .. }
        ));

        let parse = RestError::Parse("eof".into());
        assert_eq!(FetchError::from(parse), FetchError::Malformed("eof".into()));
    }
}

use thiserror::Error;

/// Failure to obtain prices, from the upstream provider or the side channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by upstream (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("incomplete response, missing: {}", missing.join(","))]
    Incomplete { missing: Vec<String> },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no data available: {0}")]
    Unavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Stable lowercase tag for logs and health output
    pub fn class(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Incomplete { .. } => "incomplete",
            FetchError::Unauthorized(_) => "unauthorized",
            FetchError::Malformed(_) => "malformed",
            FetchError::Unavailable(_) => "unavailable",
            FetchError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_message_lists_symbols() {
        let err = FetchError::Incomplete {
            missing: vec!["SOL".into(), "ADA".into()],
        };
        assert_eq!(err.to_string(), "incomplete response, missing: SOL,ADA");
        assert_eq!(err.class(), "incomplete");
    }
}

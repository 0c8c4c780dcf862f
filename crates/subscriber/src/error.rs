use thiserror::Error;

/// Failure to construct a client. Runtime failures after construction are
/// handled by retrying and never surface here.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to start dispatch thread: {0}")]
    Dispatcher(#[source] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

use thiserror::Error;

/// Failure of a single resource fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("unsupported URL scheme in {0}")]
    UnsupportedScheme(String),
}

use std::time::Duration;

/// Why a metadata lookup produced no usable result.
///
/// Every variant is terminal for the attempt that hit it.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("book not found")]
    NotFound,

    #[error("metadata service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid metadata service URL: {0}")]
    InvalidUrl(String),

    #[error("failed to fetch book: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("metadata incomplete: missing {0}")]
    Incomplete(&'static str),
}

//! Error types for the Bling OAuth credential lifecycle

/// Errors from loading client credentials, exchanging grants, acquiring
/// authorization codes, and persisting tokens.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The token endpoint answered 400. `body` is the provider's response,
    /// byte for byte.
    #[error("provider rejected the grant: {body}")]
    Provider { body: String },

    #[error("unexpected token response (status {status}): {detail}")]
    Protocol { status: u16, detail: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("authorization code acquisition failed: {0}")]
    Acquisition(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

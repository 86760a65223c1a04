//! VCS error surface

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("request to {endpoint} failed: {message}")]
    Http { endpoint: String, message: String },

    #[error("rate limited, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("unexpected response shape: {0}")]
    Parse(String),
}

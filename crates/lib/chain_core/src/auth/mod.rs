//! Outer-token signing and inspection.
//!
//! The adapter signs its JWTs with HS256. The gateway only needs to read them,
//! optionally checking the signature when it shares the adapter's secret.

pub mod jwt;

use thiserror::Error;

/// Token errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Malformed token: {0}")]
    Malformed(String),
}

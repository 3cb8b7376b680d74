//! Error types for the Optimizely API client.
//!
//! # Design
//! Only conditions that stop a request from producing an HTTP response live
//! here. A completed round trip with a 4xx/5xx status is not an error at this
//! level; it comes back as an `ApiResponse` with `Status::Error`. Every
//! variant still converts into an envelope (see `ApiResponse::from`) so
//! callers that only speak envelopes never have to match on this type.

use thiserror::Error;

/// A failure below the HTTP layer: DNS, connect, TLS, reading the body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<ureq::Error> for TransportError {
    fn from(e: ureq::Error) -> Self {
        Self(e.to_string())
    }
}

/// Errors returned by `OptimizelyClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The endpoint did not resolve to a usable URL. No request was sent.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// No bearer token is configured. No request was sent.
    #[error("no API token configured")]
    MissingCredential,

    /// The method token is not one of GET, POST, PUT, PATCH, DELETE.
    #[error("unsupported request method: {0}")]
    UnsupportedMethod(String),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The server kept answering 429 past the configured retry ceiling.
    #[error("rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },
}

impl ApiError {
    /// The status code reported in the envelope form of this error.
    pub fn code(&self) -> u16 {
        match self {
            ApiError::InvalidUrl(_) => 404,
            ApiError::MissingCredential => 401,
            ApiError::UnsupportedMethod(_) => 403,
            ApiError::Transport(_) => 0,
            ApiError::Serialization(_) => 400,
            ApiError::RateLimitExhausted { .. } => 429,
        }
    }
}

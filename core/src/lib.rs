//! Blocking client for the Optimizely REST API (v2).
//!
//! # Overview
//! Five verbs (`get`, `post`, `put`, `patch`, `delete`) funnel into one
//! executor that resolves the endpoint, attaches the bearer token, dispatches
//! through a `Transport`, and normalizes the reply into an `ApiResponse`
//! envelope. GET follows `Link` pagination and merges every page into one
//! envelope. A 429 reply is retried after the server's
//! `X-RATELIMIT-RESET` wait.
//!
//! # Design
//! - `OptimizelyClient` is stateless; token, transport and sleeper are
//!   injected capabilities, so tests swap them without process-wide state.
//! - Pre-flight failures (bad URL, no token) are typed `ApiError`s and never
//!   reach the network. Every `ApiError` converts into an envelope for callers
//!   that only deal in envelopes.
//! - Response caching belongs to the caller.

pub mod client;
pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod link;
pub mod response;
pub mod transport;

pub use client::{OptimizelyClient, Payload, Sleeper, ThreadSleeper};
pub use config::{ClientConfig, ConfigError};
pub use credentials::{CredentialSource, EnvToken, StaticToken};
pub use error::{ApiError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use response::{ApiResponse, Status};
pub use transport::{Transport, UreqTransport};

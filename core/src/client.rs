//! Request executor for the Optimizely REST API.
//!
//! # Design
//! `OptimizelyClient` keeps no mutable state between calls. Each call looks up
//! its own token, builds its own `HttpRequest`, and hands it to the
//! `Transport`. The pieces stack in this order:
//!
//! - `build_request`: URL resolution, credential lookup, body serialization.
//! - `request`: one logical operation, repeated while the server answers 429.
//!   The wait comes from `X-RATELIMIT-RESET` and goes through the injected
//!   `Sleeper`, so only the calling thread blocks.
//! - `get`: walks `Link: <...>; rel=next` pages and merges their JSON.
//!
//! Pagination ends when a page carries no `next` link. A server that links
//! pages in a cycle keeps the loop going; that is left to the server.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::credentials::{self, CredentialSource, EnvToken};
use crate::endpoint;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::link;
use crate::response::ApiResponse;
use crate::transport::{Transport, UreqTransport};

/// Ordered field map sent as a JSON body, or as query parameters for GET.
pub type Payload = Map<String, Value>;

pub const RATE_LIMIT_RESET_HEADER: &str = "X-RATELIMIT-RESET";
pub const LINK_HEADER: &str = "LINK";
pub const PER_PAGE_PARAM: &str = "per_page";

const TOO_MANY_REQUESTS: u16 = 429;

/// Blocks the current operation for a rate-limit wait.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Parks the calling thread. Other threads using the same client keep going.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Client for the Optimizely REST API.
///
/// Cheap to share across threads: it holds configuration and capabilities
/// only.
#[derive(Debug, Clone)]
pub struct OptimizelyClient<T = UreqTransport, C = EnvToken, S = ThreadSleeper> {
    config: ClientConfig,
    transport: T,
    credentials: C,
    sleeper: S,
}

impl<C: CredentialSource> OptimizelyClient<UreqTransport, C, ThreadSleeper> {
    /// A client that talks to the network through `ureq`.
    pub fn new(config: ClientConfig, credentials: C) -> Self {
        let transport = UreqTransport::new(config.timeout());
        Self::with_parts(config, transport, credentials, ThreadSleeper)
    }
}

impl<T, C, S> OptimizelyClient<T, C, S>
where
    T: Transport,
    C: CredentialSource,
    S: Sleeper,
{
    pub fn with_parts(config: ClientConfig, transport: T, credentials: C, sleeper: S) -> Self {
        let mut config = config;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            transport,
            credentials,
            sleeper,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET every page of `endpoint` and merge the results.
    ///
    /// `per_page` is added to `params` unless the caller set a non-empty
    /// value. Array pages are concatenated in order; the returned envelope's
    /// code, status and headers are those of the last page fetched. Fetching
    /// stops at the first page that is not a success, even if it carries a
    /// `next` link: its body is not merged and later pages are never
    /// requested, so the result holds only the items fetched before it.
    pub fn get(&self, endpoint: &str, params: Option<&Payload>) -> Result<ApiResponse, ApiError> {
        let mut params = params.cloned().unwrap_or_default();
        if params.get(PER_PAGE_PARAM).is_none_or(is_blank) {
            params.insert(PER_PAGE_PARAM.to_string(), Value::from(self.config.per_page));
        }

        let mut merged: Option<Value> = None;
        let mut reference = endpoint.to_string();
        let mut query = Some(&params);
        let mut page = 0u32;

        loop {
            page += 1;
            // Continuation links already carry the query string.
            let mut response = self.request(HttpMethod::Get, &reference, query.take())?;
            debug!(page, items = response.item_count(), code = response.code, "fetched page");
            if response.is_success() {
                if let Some(json) = response.json.take() {
                    merged = Some(merge_page(merged, json));
                }
            }

            let next = response.header(LINK_HEADER).and_then(link::next_link);
            match next {
                Some(next) if response.is_success() => reference = next,
                _ => {
                    if !response.is_success() {
                        warn!(page, code = response.code, "pagination stopped on error page");
                    }
                    response.json = Some(merged.unwrap_or_else(|| Value::Array(Vec::new())));
                    response.body = None;
                    return Ok(response);
                }
            }
        }
    }

    pub fn post(&self, endpoint: &str, data: Option<&Payload>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Post, endpoint, data)
    }

    pub fn put(&self, endpoint: &str, data: Option<&Payload>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Put, endpoint, data)
    }

    pub fn patch(&self, endpoint: &str, data: Option<&Payload>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Patch, endpoint, data)
    }

    pub fn delete(&self, endpoint: &str, data: Option<&Payload>) -> Result<ApiResponse, ApiError> {
        self.request(HttpMethod::Delete, endpoint, data)
    }

    /// Dispatch by method token, e.g. from a host that stores the verb as
    /// text. GET goes through pagination like `get`.
    pub fn execute(
        &self,
        method: &str,
        endpoint: &str,
        data: Option<&Payload>,
    ) -> Result<ApiResponse, ApiError> {
        match method.parse::<HttpMethod>()? {
            HttpMethod::Get => self.get(endpoint, data),
            other => self.request(other, endpoint, data),
        }
    }

    /// Run one operation, retrying the identical request after each 429.
    ///
    /// The wait before a retry is the `X-RATELIMIT-RESET` value in seconds.
    /// Retries are unbounded unless `max_rate_limit_retries` is set.
    pub fn request(
        &self,
        method: HttpMethod,
        reference: &str,
        payload: Option<&Payload>,
    ) -> Result<ApiResponse, ApiError> {
        let request = self.build_request(method, reference, payload)?;
        let mut rate_limited = 0u32;

        loop {
            debug!(
                method = %request.method,
                url = %request.url,
                attempt = rate_limited + 1,
                "dispatching request"
            );
            let raw = self.transport.send(&request)?;
            if raw.status != TOO_MANY_REQUESTS {
                let response = ApiResponse::from_http(raw);
                if !response.is_success() {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        code = response.code,
                        "request failed"
                    );
                }
                return Ok(response);
            }

            rate_limited += 1;
            if let Some(max) = self.config.max_rate_limit_retries {
                if rate_limited > max {
                    warn!(url = %request.url, attempts = rate_limited, "rate limit retries exhausted");
                    return Err(ApiError::RateLimitExhausted {
                        attempts: rate_limited,
                    });
                }
            }

            let wait = raw
                .header(RATE_LIMIT_RESET_HEADER)
                .and_then(parse_reset)
                .unwrap_or_else(|| self.config.default_rate_limit_wait());
            warn!(
                url = %request.url,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                retry = rate_limited,
                "rate limited, waiting before retry"
            );
            self.sleeper.sleep(wait);
        }
    }

    /// Build the wire request for one operation without sending it.
    ///
    /// Fails with `InvalidUrl` before looking at credentials, and with
    /// `MissingCredential` when no token is configured. GET carries `payload`
    /// as query parameters and no body; other verbs send it as JSON, `{}`
    /// when empty.
    pub fn build_request(
        &self,
        method: HttpMethod,
        reference: &str,
        payload: Option<&Payload>,
    ) -> Result<HttpRequest, ApiError> {
        let url = endpoint::resolve(&self.config.base_url, reference)?;
        let token = credentials::lookup(&self.credentials).ok_or(ApiError::MissingCredential)?;

        let (url, body) = match method {
            HttpMethod::Get => {
                let params = payload
                    .into_iter()
                    .flatten()
                    .filter_map(|(k, v)| query_value(v).map(|v| (k.as_str(), v)));
                (endpoint::with_query(url, params), None)
            }
            _ => {
                let body = match payload {
                    Some(data) if !data.is_empty() => serde_json::to_string(data)
                        .map_err(|e| ApiError::Serialization(e.to_string()))?,
                    _ => "{}".to_string(),
                };
                (url, Some(body))
            }
        };

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers: vec![
                ("authorization".to_string(), format!("Bearer {token}")),
                ("accept".to_string(), "application/json".to_string()),
                ("user-agent".to_string(), self.config.user_agent.clone()),
            ],
            body,
        })
    }
}

/// Seconds until the rate-limit window resets; fractions allowed.
fn parse_reset(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Fold one page's JSON into the running result. Arrays concatenate, objects
/// merge key by key (later pages win), anything else replaces.
fn merge_page(acc: Option<Value>, page: Value) -> Value {
    match (acc, page) {
        (None, page) => page,
        (Some(Value::Array(mut items)), Value::Array(more)) => {
            items.extend(more);
            Value::Array(items)
        }
        (Some(Value::Array(items)), page) if items.is_empty() => page,
        (Some(Value::Array(mut items)), page) => {
            items.push(page);
            Value::Array(items)
        }
        (Some(Value::Object(mut fields)), Value::Object(more)) => {
            fields.extend(more);
            Value::Object(fields)
        }
        (Some(_), page) => page,
    }
}

/// A value the caller left unset: null, false, zero, or an empty string.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

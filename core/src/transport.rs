//! One HTTP round trip per call.
//!
//! # Design
//! `Transport` is the only place network I/O happens. It never retries and
//! never interprets status codes: a 429 or a 500 is a successful round trip
//! that returns an `HttpResponse`. Only failures that leave no response to
//! normalize (connect, TLS, reading the body) surface as `TransportError`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;
use ureq::Agent;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes a single `HttpRequest`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
///
/// 4xx/5xx responses are returned as data, not `Err`, so the client can
/// normalize them like any other status.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let body = request.body.as_deref();

        // GET is the only verb sent without a body. DELETE gets one forced
        // on when present so every non-GET verb carries its JSON payload.
        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(url);
                for (k, v) in &request.headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                builder.call()
            }
            HttpMethod::Delete => {
                let mut builder = self.agent.delete(url);
                for (k, v) in &request.headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                match body {
                    Some(body) => builder
                        .force_send_body()
                        .content_type("application/json")
                        .send(body.as_bytes()),
                    None => builder.call(),
                }
            }
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
                let mut builder = match request.method {
                    HttpMethod::Post => self.agent.post(url),
                    HttpMethod::Put => self.agent.put(url),
                    _ => self.agent.patch(url),
                };
                for (k, v) in &request.headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                match body {
                    Some(body) => builder.content_type("application/json").send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_string()?;
        trace!(status, bytes = body.len(), "response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

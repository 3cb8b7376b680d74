//! Bearer token sources.
//!
//! The token is read on every request rather than captured at construction,
//! so a token saved while the client is alive takes effect on the next call.

use std::env;

/// Default environment variable read by `EnvToken`.
pub const TOKEN_ENV_VAR: &str = "OPTIMIZELY_TOKEN";

/// Supplies the bearer token for API requests.
///
/// Returning `None` or a blank string means "not configured"; the client
/// then answers with a `NOTOKEN` envelope without touching the network.
pub trait CredentialSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reads the token from an environment variable on each lookup.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl CredentialSource for EnvToken {
    fn token(&self) -> Option<String> {
        env::var(&self.var).ok()
    }
}

impl CredentialSource for Option<String> {
    fn token(&self) -> Option<String> {
        self.clone()
    }
}

impl<C: CredentialSource + ?Sized> CredentialSource for std::sync::Arc<C> {
    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

/// Look up a token and drop it if blank. Surrounding whitespace is trimmed.
pub(crate) fn lookup(source: &dyn CredentialSource) -> Option<String> {
    source
        .token()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

//! Endpoint resolution against the API base URL.

use url::Url;

use crate::error::ApiError;

/// Turn an endpoint reference into the URL to request.
///
/// A reference that already starts with `base_url` is used as-is; this is the
/// shape of pagination links handed back by the server. Anything else is
/// treated as a path suffix and appended to `base_url` verbatim.
pub fn resolve(base_url: &str, reference: &str) -> Result<Url, ApiError> {
    let raw = if !base_url.is_empty() && reference.starts_with(base_url) {
        reference.to_string()
    } else {
        format!("{base_url}{reference}")
    };

    let url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(ApiError::InvalidUrl(raw));
    }
    Ok(url)
}

/// Append `params` to the query string, keeping any pairs already present.
pub fn with_query<'a, I>(mut url: Url, params: I) -> Url
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut params = params.into_iter().peekable();
    if params.peek().is_some() {
        url.query_pairs_mut().extend_pairs(params);
    }
    url
}

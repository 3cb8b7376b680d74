//! The response envelope handed back to callers.
//!
//! # Design
//! Every call ends in an `ApiResponse`, whether the server answered 200, the
//! server answered 500, or no request was sent at all. Pre-flight and
//! transport failures are produced as `ApiError` first and converted here, so
//! the code, status and message for each failure kind are defined in one
//! place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Outcome classification carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Error,
    #[serde(rename = "NOTOKEN")]
    NoToken,
}

/// Normalized result of one logical API call.
///
/// Header names are lowercased; repeated headers are joined with `", "`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: u16,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub json: Option<Value>,
    /// Raw body text. `None` on aggregated GET results and on failures that
    /// never reached the server.
    pub body: Option<String>,
}

impl ApiResponse {
    /// Normalize a raw round trip. Codes 200 through 204 are success; the
    /// body is decoded as JSON when possible and left `None` otherwise.
    pub fn from_http(response: HttpResponse) -> Self {
        let json = serde_json::from_str::<Value>(&response.body).ok();
        let success = is_success_code(response.status);
        let error = if success {
            Vec::new()
        } else {
            vec![error_text(response.status, json.as_ref())]
        };

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers {
            headers
                .entry(name.to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        Self {
            code: response.status,
            status: if success { Status::Success } else { Status::Error },
            error,
            headers,
            json,
            body: Some(response.body),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All error messages joined by newlines, or `None` on success.
    pub fn error_message(&self) -> Option<String> {
        if self.error.is_empty() {
            None
        } else {
            Some(self.error.join("\n"))
        }
    }

    /// Number of items in `json` when it is an array.
    pub fn item_count(&self) -> usize {
        self.json
            .as_ref()
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    fn failure(code: u16, status: Status, message: String) -> Self {
        Self {
            code,
            status,
            error: vec![message],
            headers: BTreeMap::new(),
            json: None,
            body: None,
        }
    }
}

impl From<ApiError> for ApiResponse {
    fn from(err: ApiError) -> Self {
        let code = err.code();
        match err {
            ApiError::InvalidUrl(_) => {
                Self::failure(code, Status::Error, "Invalid API URL.".to_string())
            }
            ApiError::MissingCredential => Self::failure(
                code,
                Status::NoToken,
                "You have not filled in a token.".to_string(),
            ),
            ApiError::UnsupportedMethod(_) => {
                Self::failure(code, Status::Error, "Invalid request method.".to_string())
            }
            other => Self::failure(code, Status::Error, other.to_string()),
        }
    }
}

pub(crate) fn is_success_code(code: u16) -> bool {
    (200..=204).contains(&code)
}

/// Prefer the API's own `message` field; fall back to the bare status.
fn error_text(code: u16, json: Option<&Value>) -> String {
    json.and_then(|j| j.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("HTTP {code}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
        }
    }

    #[test]
    fn success_range_is_200_to_204() {
        for code in [200, 201, 202, 203, 204] {
            assert!(ApiResponse::from_http(raw(code, &[], "")).is_success(), "{code}");
        }
        for code in [199, 205, 301, 404, 500] {
            let r = ApiResponse::from_http(raw(code, &[], ""));
            assert_eq!(r.status, Status::Error, "{code}");
        }
    }

    #[test]
    fn success_decodes_json_and_keeps_body() {
        let r = ApiResponse::from_http(raw(200, &[], r#"{"id":55,"status":"running"}"#));
        assert_eq!(r.code, 200);
        assert!(r.error.is_empty());
        assert_eq!(r.json, Some(json!({"id": 55, "status": "running"})));
        assert_eq!(r.body.as_deref(), Some(r#"{"id":55,"status":"running"}"#));
    }

    #[test]
    fn undecodable_body_leaves_json_empty() {
        let r = ApiResponse::from_http(raw(204, &[], ""));
        assert!(r.is_success());
        assert_eq!(r.json, None);
    }

    #[test]
    fn error_uses_api_message() {
        let r = ApiResponse::from_http(raw(
            400,
            &[],
            r#"{"code":400,"message":"Invalid project_id"}"#,
        ));
        assert_eq!(r.status, Status::Error);
        assert_eq!(r.error, vec!["Invalid project_id".to_string()]);
    }

    #[test]
    fn error_without_message_falls_back_to_code() {
        let r = ApiResponse::from_http(raw(502, &[], "<html>bad gateway</html>"));
        assert_eq!(r.error_message().as_deref(), Some("HTTP 502"));
    }

    #[test]
    fn headers_are_lowercased_and_joined() {
        let r = ApiResponse::from_http(raw(
            200,
            &[
                ("Link", "<https://a>; rel=prev"),
                ("LINK", "<https://b>; rel=next"),
                ("X-RateLimit-Reset", "3"),
            ],
            "[]",
        ));
        assert_eq!(r.header("link"), Some("<https://a>; rel=prev, <https://b>; rel=next"));
        assert_eq!(r.header("X-RATELIMIT-RESET"), Some("3"));
    }

    #[test]
    fn missing_credential_envelope() {
        let r = ApiResponse::from(ApiError::MissingCredential);
        assert_eq!(r.code, 401);
        assert_eq!(r.status, Status::NoToken);
        assert_eq!(r.error_message().as_deref(), Some("You have not filled in a token."));
    }

    #[test]
    fn invalid_url_envelope() {
        let r = ApiResponse::from(ApiError::InvalidUrl("x".into()));
        assert_eq!(r.code, 404);
        assert_eq!(r.status, Status::Error);
        assert_eq!(r.error, vec!["Invalid API URL.".to_string()]);
    }

    #[test]
    fn status_serializes_as_wire_tokens() {
        assert_eq!(serde_json::to_value(Status::Success).unwrap(), json!("SUCCESS"));
        assert_eq!(serde_json::to_value(Status::Error).unwrap(), json!("ERROR"));
        assert_eq!(serde_json::to_value(Status::NoToken).unwrap(), json!("NOTOKEN"));
    }

    #[test]
    fn item_count_only_counts_arrays() {
        let r = ApiResponse::from_http(raw(200, &[], r#"[1,2,3]"#));
        assert_eq!(r.item_count(), 3);
        let r = ApiResponse::from_http(raw(200, &[], r#"{"a":1}"#));
        assert_eq!(r.item_count(), 0);
    }
}

//! Outbound HTTP to external systems.
//!
//! [`ExternalApi`] abstracts the single POST a dispatch performs so the
//! dispatcher can be exercised without a network.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DispatchError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered response from an external system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait ExternalApi: Send + Sync {
    /// POST `payload` as JSON to `url`.
    ///
    /// Transport failures are `DispatchError::Delivery`; any status code,
    /// including errors, comes back as an `HttpResponse`.
    async fn post_json(&self, url: &str, payload: &Value) -> Result<HttpResponse, DispatchError>;
}

// ── Production implementation using reqwest ─────────────────────────

#[derive(Clone)]
pub struct ReqwestExternalApi {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestExternalApi {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Default for ReqwestExternalApi {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ExternalApi for ReqwestExternalApi {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<HttpResponse, DispatchError> {
        tracing::debug!(url = %url, timeout_secs = self.timeout.as_secs(), "posting payload");

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| DispatchError::Delivery(format!("request to {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DispatchError::Delivery(format!("reading response from {url}: {e}")))?;

        Ok(HttpResponse { status, body })
    }
}

/// Extract the identifier an external system assigned, found at `data.id`.
///
/// Strings are taken as-is and numbers are rendered in decimal; anything else
/// is a malformed response.
pub fn parse_external_id(body: &str) -> Result<String, DispatchError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| DispatchError::MalformedResponse(format!("invalid JSON: {e}")))?;

    match json.pointer("/data/id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(DispatchError::MalformedResponse(format!(
            "data.id has unexpected value {other}"
        ))),
        None => Err(DispatchError::MalformedResponse("missing data.id".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_numeric_ids() {
        assert_eq!(
            parse_external_id(r#"{"status":"success","data":{"id":"ABC-1"}}"#).unwrap(),
            "ABC-1"
        );
        assert_eq!(parse_external_id(r#"{"data":{"id":42}}"#).unwrap(), "42");
    }

    #[test]
    fn rejects_bodies_without_nested_id() {
        for body in ["", "not json", r#"{"id":1}"#, r#"{"data":{}}"#, r#"{"data":{"id":null}}"#] {
            let err = parse_external_id(body).unwrap_err();
            assert!(matches!(err, DispatchError::MalformedResponse(_)), "{body}");
        }
    }

    #[test]
    fn success_covers_2xx_only() {
        let ok = |status| HttpResponse {
            status,
            body: String::new(),
        };
        assert!(ok(200).is_success());
        assert!(ok(201).is_success());
        assert!(!ok(302).is_success());
        assert!(!ok(500).is_success());
    }
}

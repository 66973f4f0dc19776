//! Authenticated HTTP client for the school-administration API.
//!
//! `SchoolClient` pairs a `reqwest::Client` with a shared `TokenProvider` and
//! issues JSON POSTs carrying `Authorization: Bearer <token>`.
//!
//! Each call makes exactly one upstream request. There is no retry: a
//! `401`/`403` is surfaced as `RelayError::Auth` after the rejected token has
//! been discarded, so the *next* call re-authenticates.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenProvider;
use crate::cancel::run_cancellable;
use crate::error::{RelayError, Result};

/// Covers TCP + TLS handshake only.
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Full round-trip limit enforced by the transport itself.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// # Panics
///
/// Panics if the TLS backend cannot be initialised.
fn build_api_client() -> Client {
    Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT)
        .timeout(API_REQUEST_TIMEOUT)
        .build()
        .expect("failed to build HTTP client for the school API")
}

/// Authenticated HTTP client for the school API.
///
/// `tokens` is an `Arc` so the relay route and any other caller can share one
/// cache slot. `base_url` is kept without a trailing slash; paths are joined
/// with exactly one `/`.
pub struct SchoolClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenProvider>,
    deadline: Option<Duration>,
}

impl SchoolClient {
    /// Creates a client for `base_url` that authenticates through `tokens`.
    pub fn new(tokens: Arc<TokenProvider>, base_url: &str) -> Self {
        SchoolClient {
            client: build_api_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            deadline: None,
        }
    }

    /// Bounds each call (token acquisition plus the POST) by `deadline`.
    /// Exceeding it yields `RelayError::Cancelled`.
    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The token provider this client authenticates with.
    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one authenticated JSON POST and returns the parsed body as-is.
    ///
    /// Response mapping:
    /// - 2xx with a JSON body → `Ok(body)`
    /// - 2xx with an empty body, `null`, `false`, `0` or `""` → `Schema`
    /// - 2xx with a non-JSON body → `Parse`
    /// - 401/403 → `Auth`, and the token that was sent is discarded
    /// - any other status → `Upstream` with the body preserved
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let url = self.url(path);
        run_cancellable(
            cancel,
            self.deadline,
            "school API request",
            self.send_once(&url, body, cancel),
        )
        .await
    }

    async fn send_once<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let token = self.tokens.token_with_cancel(cancel).await?;

        tracing::debug!(%url, "sending school API request");
        let resp = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(%status, "school API rejected the access token");
            self.tokens.invalidate_if_current(&token).await;
            return Err(RelayError::rejected("school API request", status, text));
        }

        if !status.is_success() {
            tracing::warn!(%status, "school API returned an error status");
            return Err(RelayError::Upstream { status, body: text });
        }

        if text.trim().is_empty() {
            return Err(RelayError::Schema {
                message: "school API returned an empty body".to_string(),
            });
        }

        let value = serde_json::from_str::<Value>(&text)?;
        if is_absent(&value) {
            return Err(RelayError::Schema {
                message: format!("school API returned an empty payload: {value}"),
            });
        }
        Ok(value)
    }
}

/// Payloads the relay treats as "no data": `null`, `false`, numeric zero and
/// the empty string. Empty arrays and objects are real (if empty) reports.
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_with_a_single_slash() {
        let tp = Arc::new(TokenProvider::with_token("t"));
        let client = SchoolClient::new(tp.clone(), "http://school.local/api/");
        assert_eq!(
            client.url("/score-semester"),
            "http://school.local/api/score-semester"
        );

        let client = SchoolClient::new(tp, "http://school.local/api");
        assert_eq!(
            client.url("score-semester"),
            "http://school.local/api/score-semester"
        );
    }

    #[test]
    fn falsy_payloads_count_as_absent() {
        for value in [
            serde_json::json!(null),
            serde_json::json!(false),
            serde_json::json!(0),
            serde_json::json!(0.0),
            serde_json::json!(""),
        ] {
            assert!(is_absent(&value), "{value} should be absent");
        }
        for value in [
            serde_json::json!(true),
            serde_json::json!(1),
            serde_json::json!("x"),
            serde_json::json!([]),
            serde_json::json!({}),
        ] {
            assert!(!is_absent(&value), "{value} should be passed through");
        }
    }
}

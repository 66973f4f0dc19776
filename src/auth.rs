//! OAuth2 client-credentials authentication for the school API.
//!
//! `TokenProvider` exchanges the configured client credentials for a bearer
//! token at the identity endpoint and caches it until it expires (minus a
//! safety buffer). It owns the only shared mutable state in the relay: a
//! single cache slot behind an async mutex.
//!
//! Token lifecycle:
//! - Lazy acquisition: the first `token()` call that finds the slot empty
//!   performs the exchange.
//! - Expiry-aware: a cached token past `issued_at + ttl - buffer` is
//!   discarded and never handed out again.
//! - Single-flight: the mutex is held across the exchange, so callers that
//!   arrive while a refresh is in flight wait for it and reuse its result
//!   instead of starting their own.
//! - Replace-on-success: a failed exchange leaves the slot empty.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cancel::run_cancellable;
use crate::error::{RelayError, Result};

/// Safety buffer subtracted from `expires_in` so a token is refreshed before
/// the upstream considers it expired.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token requests are small; anything slower than this is a dead endpoint.
const TOKEN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Form body sent to the token endpoint.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

/// The part of the identity endpoint's response that the relay uses.
/// Extra fields are ignored.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Opaque bearer credential.
    pub access_token: String,
    /// Lifetime in seconds from the moment of issue.
    pub expires_in: u64,
    /// Usually `"Bearer"`; some providers omit it.
    #[serde(default)]
    pub token_type: Option<String>,
}

/// A bearer token together with the time it was issued and its lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    issued_at: Instant,
    ttl: Duration,
}

impl AccessToken {
    /// Creates a token issued now with the given lifetime.
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        AccessToken {
            secret: secret.into(),
            issued_at: Instant::now(),
            ttl,
        }
    }

    /// The raw bearer string to put in an `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Lifetime reported by the identity endpoint.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the token was stored.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// `true` while `now < issued_at + ttl - buffer`.
    pub fn is_valid(&self, buffer: Duration) -> bool {
        self.issued_at.elapsed() < self.ttl.saturating_sub(buffer)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Acquires and caches OAuth2 access tokens for the school API.
///
/// Invariants:
/// - The slot holds either nothing or a token obtained from a successful
///   exchange. Partial or failed exchanges are never stored.
/// - A token handed out by `token()` was valid at the moment it was
///   returned.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    expiry_buffer: Duration,
    cache: Mutex<Option<AccessToken>>,
    exchanges: AtomicU64,
}

/// # Panics
///
/// Panics if the TLS backend cannot be initialised, which only happens on a
/// broken host configuration.
fn build_token_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(TOKEN_CONNECT_TIMEOUT)
        .timeout(TOKEN_REQUEST_TIMEOUT)
        .build()
        .expect("failed to build HTTP client for the identity endpoint")
}

impl TokenProvider {
    /// Creates a provider that exchanges `client_id`/`client_secret` at
    /// `token_url`. The cache starts empty.
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: Option<&str>,
    ) -> Self {
        TokenProvider {
            client: build_token_client(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: scope.map(str::to_string),
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            cache: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Creates a provider with a pre-seeded token and no usable identity
    /// endpoint. Used by tests that only exercise the score endpoint.
    pub fn with_token(token: &str) -> Self {
        let provider = TokenProvider::new("", "", "", None);
        TokenProvider {
            cache: Mutex::new(Some(AccessToken::new(token, Duration::from_secs(3600)))),
            ..provider
        }
    }

    /// Overrides the safety buffer subtracted from each token's lifetime.
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Number of token exchanges attempted so far, successful or not.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Returns a currently valid token, exchanging credentials if the cache
    /// is empty or the cached token has expired.
    pub async fn token(&self) -> Result<AccessToken> {
        self.current_or_refresh().await
    }

    /// Like [`token`](Self::token), but gives up with `Cancelled` once
    /// `cancel` fires. The cache is left untouched when that happens.
    pub async fn token_with_cancel(&self, cancel: &CancellationToken) -> Result<AccessToken> {
        run_cancellable(cancel, None, "token exchange", self.current_or_refresh()).await
    }

    /// Discards the cached token unconditionally.
    pub async fn invalidate(&self) {
        let mut slot = self.cache.lock().await;
        if slot.take().is_some() {
            tracing::debug!("cached access token invalidated");
        }
    }

    /// Discards the cached token only if it is still `used`.
    ///
    /// When a request is rejected with a token that another caller has
    /// already replaced, the newer token stays.
    pub async fn invalidate_if_current(&self, used: &AccessToken) {
        let mut slot = self.cache.lock().await;
        if slot.as_ref() == Some(used) {
            *slot = None;
            tracing::debug!("rejected access token discarded");
        }
    }

    async fn current_or_refresh(&self) -> Result<AccessToken> {
        let mut slot = self.cache.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_valid(self.expiry_buffer) {
                tracing::debug!("reusing cached access token");
                return Ok(token.clone());
            }
            tracing::debug!("cached access token expired");
            *slot = None;
        }

        // The lock stays held across the exchange; waiters reuse the result.
        let fresh = self.exchange().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Performs one client-credentials exchange. Does not touch the cache.
    ///
    /// The body is read as text before checking the status so the provider's
    /// error description ends up in the `Auth` error.
    async fn exchange(&self) -> Result<AccessToken> {
        self.exchanges.fetch_add(1, Ordering::Relaxed);

        let form = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            scope: self.scope.as_deref(),
        };

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RelayError::Auth {
                message: format!("token endpoint unreachable: {e}"),
                status: None,
                body: None,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RelayError::Auth {
            message: format!("failed to read token response ({status})"),
            status: Some(status),
            body: None,
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            tracing::warn!(%status, "token request rejected");
            return Err(RelayError::rejected("token request", status, body));
        }

        let parsed: TokenResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(RelayError::Auth {
                    message: format!("unparsable token response ({status}): {body}"),
                    status: Some(status),
                    body: Some(body),
                    source: Some(Box::new(e)),
                });
            }
        };

        if parsed.access_token.is_empty() {
            return Err(RelayError::Auth {
                message: "token response carried an empty access_token".to_string(),
                status: Some(status),
                body: Some(body),
                source: None,
            });
        }

        tracing::info!(
            expires_in = parsed.expires_in,
            token_type = parsed.token_type.as_deref().unwrap_or("Bearer"),
            "acquired access token"
        );
        Ok(AccessToken::new(
            parsed.access_token,
            Duration::from_secs(parsed.expires_in),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_aged(ttl_secs: u64, age_secs: u64) -> AccessToken {
        AccessToken {
            secret: "test-token".to_string(),
            issued_at: Instant::now() - Duration::from_secs(age_secs),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    #[test]
    fn token_request_serializes_as_form() {
        let req = TokenRequest {
            grant_type: "client_credentials",
            client_id: "cid",
            client_secret: "secret~value",
            scope: Some("school.read"),
        };
        let encoded = serde_urlencoded::to_string(&req).unwrap();
        assert!(encoded.contains("grant_type=client_credentials"));
        assert!(encoded.contains("client_id=cid"));
        assert!(encoded.contains("scope=school.read"));
    }

    #[test]
    fn token_request_omits_missing_scope() {
        let req = TokenRequest {
            grant_type: "client_credentials",
            client_id: "cid",
            client_secret: "s",
            scope: None,
        };
        let encoded = serde_urlencoded::to_string(&req).unwrap();
        assert!(!encoded.contains("scope"), "got: {encoded}");
    }

    #[test]
    fn token_response_ignores_unknown_fields_and_missing_type() {
        let json = r#"{
            "access_token": "abc",
            "expires_in": 3600,
            "refresh_expires_in": 0,
            "not-before-policy": 0
        }"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token, "abc");
        assert_eq!(resp.expires_in, 3600);
        assert!(resp.token_type.is_none());
    }

    #[test]
    fn fresh_token_is_valid() {
        assert!(token_aged(3600, 0).is_valid(DEFAULT_EXPIRY_BUFFER));
    }

    #[test]
    fn old_token_is_invalid() {
        // 100s lifetime minus the buffer leaves 40s; 50s have passed.
        assert!(!token_aged(100, 50).is_valid(DEFAULT_EXPIRY_BUFFER));
    }

    #[test]
    fn token_within_buffer_is_invalid() {
        // 90s lifetime minus a 60s buffer leaves 30s.
        assert!(!token_aged(90, 31).is_valid(DEFAULT_EXPIRY_BUFFER));
        assert!(token_aged(90, 10).is_valid(DEFAULT_EXPIRY_BUFFER));
    }

    #[test]
    fn ttl_shorter_than_buffer_is_never_valid() {
        assert!(!token_aged(30, 0).is_valid(DEFAULT_EXPIRY_BUFFER));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", AccessToken::new("super-secret", Duration::from_secs(1)));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("redacted"));
    }

    #[tokio::test]
    async fn seeded_provider_serves_cached_token_without_exchange() {
        let tp = TokenProvider::with_token("seeded");
        let token = tp.token().await.unwrap();
        assert_eq!(token.secret(), "seeded");
        assert_eq!(tp.exchange_count(), 0);
    }

    #[tokio::test]
    async fn invalidate_if_current_keeps_a_newer_token() {
        let tp = TokenProvider::with_token("newer");
        let stale = AccessToken::new("older", Duration::from_secs(3600));
        tp.invalidate_if_current(&stale).await;
        assert_eq!(tp.cache.lock().await.as_ref().map(AccessToken::secret), Some("newer"));

        let current = tp.token().await.unwrap();
        tp.invalidate_if_current(&current).await;
        assert!(tp.cache.lock().await.is_none());
    }
}

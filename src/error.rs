//! Typed error hierarchy for the score relay.
//!
//! Every variant maps to a real system boundary:
//! - `Auth` covers the identity endpoint and auth rejections from the
//!   school API (401/403).
//! - `Upstream` and `Network` cover the school API's score endpoint.
//! - `Schema` and `Parse` cover a successful response whose payload is
//!   unusable.
//! - `Cancelled` covers caller-initiated cancellation and deadlines.
//!
//! Nothing is recovered locally. Every failure propagates to the relay
//! route, which turns it into a status code and message.

use reqwest::StatusCode;

/// Unified error type for all relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Token acquisition failed, or the school API rejected the bearer token.
    ///
    /// `status` and `body` are populated whenever an HTTP response was
    /// received, so callers can see the identity provider's own diagnostic.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description including status and body when available.
        message: String,
        /// HTTP status returned by the rejecting endpoint, if any.
        status: Option<StatusCode>,
        /// Raw response body returned by the rejecting endpoint, if any.
        body: Option<String>,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The score endpoint returned a non-success status other than 401/403.
    #[error("upstream error {status}: {body}")]
    Upstream {
        /// The HTTP status code returned by the school API.
        status: StatusCode,
        /// The raw response body, or an empty string if it could not be read.
        body: String,
    },

    /// The score endpoint answered with success but the payload was empty
    /// or `null`.
    #[error("unexpected upstream format: {message}")]
    Schema {
        /// What was wrong with the payload.
        message: String,
    },

    /// A success response body was not valid JSON.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure reaching the school API (DNS, TCP, TLS,
    /// transport timeout). No HTTP status is available.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The caller cancelled the operation or its deadline elapsed.
    #[error("operation cancelled: {reason}")]
    Cancelled {
        /// Why the operation stopped.
        reason: String,
    },
}

impl RelayError {
    /// Builds an `Auth` error from a rejected HTTP response.
    pub(crate) fn rejected(what: &str, status: StatusCode, body: String) -> Self {
        RelayError::Auth {
            message: format!("{what} rejected ({status}): {body}"),
            status: Some(status),
            body: Some(body),
            source: None,
        }
    }

    /// Returns `true` for the "bad upstream format" condition the relay
    /// route reports as a client-visible 400.
    pub fn is_schema(&self) -> bool {
        matches!(self, RelayError::Schema { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RelayError>;

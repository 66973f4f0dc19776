//! Relay that republishes a school-administration API's semester score
//! report to a single-page frontend.
//!
//! Authenticates with the OAuth2 client-credentials grant, caches the access
//! token until it expires, and forwards the upstream JSON untouched.
//!
//! # Modules
//!
//! - [`auth`]: token provider with expiry tracking and single-flight refresh.
//! - [`client`]: authenticated HTTP wrapper for the school API.
//! - [`config`]: command-line and environment configuration.
//! - [`error`]: typed error hierarchy (`RelayError`).
//! - [`score`]: the score-semester query and fetcher.
//! - [`server`]: axum router exposing the relay endpoint.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use score_relay::auth::TokenProvider;
//! use score_relay::client::SchoolClient;
//! use score_relay::score::{ScoreFetcher, ScoreQuery};
//!
//! let tokens = Arc::new(TokenProvider::new(
//!     "https://id.school.example/token", "client_id", "secret", None,
//! ));
//! let fetcher = ScoreFetcher::new(SchoolClient::new(tokens, "https://api.school.example"));
//! let report = fetcher.fetch(&ScoreQuery::default()).await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod score;
pub mod server;

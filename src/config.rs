//! Process configuration, read once at startup.
//!
//! Every option can come from the command line or the environment; `main`
//! loads a `.env` file first so local development only needs that file.
//! Beyond presence, nothing is validated here.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::score::ScoreQuery;

/// Relay settings. Every flag has an environment-variable fallback.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Base URL of the identity provider that issues access tokens.
    #[arg(long, env = "IDENTITY_BASE_URL")]
    pub identity_base_url: String,

    /// Path of the token endpoint, appended to the identity base URL.
    #[arg(long, env = "TOKEN_PATH", default_value = "/token")]
    pub token_path: String,

    /// Base URL of the school-administration API.
    #[arg(long, env = "SCHOOL_API_URL")]
    pub school_api_url: String,

    /// OAuth2 client ID.
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// OAuth2 client secret. Prefer the environment variable so the secret
    /// stays out of process listings and shell history.
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Scope requested in the token exchange, if the provider needs one.
    #[arg(long, env = "OAUTH_SCOPE")]
    pub scope: Option<String>,

    /// Address the relay listens on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Academic year of the default score query.
    #[arg(long, env = "SCORE_YEAR", default_value_t = 113)]
    pub score_year: u32,

    /// Semester of the default score query.
    #[arg(long, env = "SCORE_SEMESTER", default_value_t = 1)]
    pub score_semester: u32,

    /// Grade of the default score query.
    #[arg(long, env = "SCORE_GRADE", default_value_t = 5)]
    pub score_grade: u32,

    /// Class number of the default score query.
    #[arg(long, env = "SCORE_CLASS_NO", default_value_t = 1)]
    pub score_class_no: u32,

    /// Seconds subtracted from each token's lifetime before it is refreshed.
    #[arg(long, env = "TOKEN_EXPIRY_BUFFER_SECS", default_value_t = 60)]
    pub token_expiry_buffer_secs: u64,

    /// Upper bound on one relay call (token + score request), in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}",
            self.identity_base_url.trim_end_matches('/'),
            self.token_path.trim_start_matches('/')
        )
    }

    /// The query the relay route uses when the caller does not override it.
    pub fn default_query(&self) -> ScoreQuery {
        ScoreQuery {
            year: self.score_year,
            semester: self.score_semester,
            grade: self.score_grade,
            class_no: self.score_class_no,
        }
    }

    /// Safety buffer applied to every cached token.
    pub fn token_expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.token_expiry_buffer_secs)
    }

    /// Per-call deadline, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

//! HTTP surface of the relay.
//!
//! One route, `GET /api/score-semester`, forwards to [`ScoreFetcher`] and
//! wraps the outcome in the envelope the frontend expects:
//!
//! | outcome            | status | body                                        |
//! |--------------------|--------|---------------------------------------------|
//! | success            | 200    | `{"success":true,"data":…}`                 |
//! | empty/null payload | 400    | `{"success":false,"message":…}`             |
//! | bad query string   | 400    | `{"success":false,"message":…,"error":…}`   |
//! | any other error    | 500    | `{"success":false,"message":…,"error":…}`   |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::error::RelayError;
use crate::score::{ScoreFetcher, ScoreQuery};

/// Path of the relay endpoint.
pub const SCORE_ROUTE: &str = "/api/score-semester";

const BAD_FORMAT_MESSAGE: &str = "school API returned an unexpected format";
const SYNC_FAILED_MESSAGE: &str = "sync failed";
const BAD_QUERY_MESSAGE: &str = "invalid score query parameters";

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Fetcher every request goes through.
    pub fetcher: Arc<ScoreFetcher>,
    /// Used for any query field the caller leaves out.
    pub default_query: ScoreQuery,
    /// Fired on shutdown; in-flight upstream calls end with `Cancelled`.
    pub shutdown: CancellationToken,
}

/// Optional per-request overrides of the configured query.
#[derive(Debug, Default, Deserialize)]
pub struct ScoreParams {
    /// Overrides the academic year.
    pub year: Option<u32>,
    /// Overrides the semester.
    pub semester: Option<u32>,
    /// Overrides the grade.
    pub grade: Option<u32>,
    /// Overrides the class number.
    pub class_no: Option<u32>,
}

impl ScoreParams {
    fn over(self, base: ScoreQuery) -> ScoreQuery {
        ScoreQuery {
            year: self.year.unwrap_or(base.year),
            semester: self.semester.unwrap_or(base.semester),
            grade: self.grade.unwrap_or(base.grade),
            class_no: self.class_no.unwrap_or(base.class_no),
        }
    }
}

/// Response envelope shared by success and failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    /// `true` only when `data` carries the upstream report.
    pub success: bool,
    /// The upstream payload, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Short user-facing description of a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Detailed cause of a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayResponse {
    fn ok(data: Value) -> Self {
        RelayResponse {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    fn failure(message: &str, error: Option<String>) -> Self {
        RelayResponse {
            success: false,
            data: None,
            message: Some(message.to_string()),
            error,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, body) = if self.is_schema() {
            (
                StatusCode::BAD_REQUEST,
                RelayResponse::failure(BAD_FORMAT_MESSAGE, None),
            )
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                RelayResponse::failure(SYNC_FAILED_MESSAGE, Some(self.to_string())),
            )
        };

        (status, Json(body)).into_response()
    }
}

async fn score_semester(
    State(state): State<AppState>,
    params: Result<Query<ScoreParams>, QueryRejection>,
) -> Response {
    // A malformed override still gets the JSON envelope, not axum's plain text.
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "rejected score query");
            let body = RelayResponse::failure(BAD_QUERY_MESSAGE, Some(rejection.body_text()));
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };
    let query = params.over(state.default_query);

    match state.fetcher.fetch_with_cancel(&query, &state.shutdown).await {
        Ok(data) => {
            tracing::info!(?query, "score report relayed");
            (StatusCode::OK, Json(RelayResponse::ok(data))).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, ?query, "score sync failed");
            err.into_response()
        }
    }
}

/// Builds the relay router. CORS is permissive because the frontend is
/// served from its own origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(SCORE_ROUTE, get(score_semester))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

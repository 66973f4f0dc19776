//! Semester score report retrieval.
//!
//! `ScoreFetcher` posts a `ScoreQuery` to `{base_url}/score-semester` and
//! hands back the upstream JSON without looking inside it.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::SchoolClient;
use crate::error::Result;

const SCORE_SEMESTER_PATH: &str = "score-semester";

/// The raw JSON payload of the score endpoint. Its shape is defined upstream.
pub type ScoreResult = serde_json::Value;

/// Request body for the score-semester endpoint.
///
/// Field names and types match what the school API expects; nothing is
/// validated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreQuery {
    /// Academic year (ROC calendar, e.g. 113).
    pub year: u32,
    /// Semester within the year, 1 or 2.
    pub semester: u32,
    /// Grade level.
    pub grade: u32,
    /// Class number within the grade.
    pub class_no: u32,
}

impl Default for ScoreQuery {
    fn default() -> Self {
        ScoreQuery {
            year: 113,
            semester: 1,
            grade: 5,
            class_no: 1,
        }
    }
}

/// Fetches semester score reports through an authenticated `SchoolClient`.
pub struct ScoreFetcher {
    client: SchoolClient,
}

impl ScoreFetcher {
    /// Wraps `client`; all fetches go through it.
    pub fn new(client: SchoolClient) -> Self {
        ScoreFetcher { client }
    }

    /// The underlying authenticated client.
    pub fn client(&self) -> &SchoolClient {
        &self.client
    }

    /// Issues one POST for `query` and returns the body verbatim.
    ///
    /// # Errors
    ///
    /// - `Auth`: token exchange failed, or the school API answered 401/403.
    /// - `Upstream` / `Network`: the score endpoint failed or was unreachable.
    /// - `Schema`: the score endpoint answered with an empty body, `null`,
    ///   `false`, `0` or `""`.
    /// - `Parse`: the score endpoint answered with something that isn't JSON.
    pub async fn fetch(&self, query: &ScoreQuery) -> Result<ScoreResult> {
        self.fetch_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Like [`fetch`](Self::fetch), abandoning the call with `Cancelled`
    /// once `cancel` fires.
    pub async fn fetch_with_cancel(
        &self,
        query: &ScoreQuery,
        cancel: &CancellationToken,
    ) -> Result<ScoreResult> {
        tracing::debug!(
            year = query.year,
            semester = query.semester,
            grade = query.grade,
            class_no = query.class_no,
            "fetching semester scores"
        );
        self.client
            .post_json(SCORE_SEMESTER_PATH, query, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_matches_the_fixed_report() {
        assert_eq!(
            serde_json::to_value(ScoreQuery::default()).unwrap(),
            serde_json::json!({"year": 113, "semester": 1, "grade": 5, "class_no": 1})
        );
    }

    #[test]
    fn query_serializes_exactly_four_keys() {
        let value = serde_json::to_value(ScoreQuery {
            year: 112,
            semester: 2,
            grade: 3,
            class_no: 7,
        })
        .unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys.len(), 4);
        for key in ["year", "semester", "grade", "class_no"] {
            assert!(keys.contains(&key), "missing {key}");
        }
    }
}

//! Cancellation support for the two network calls.
//!
//! Both the token exchange and the score POST race against an external
//! `CancellationToken` and, optionally, a deadline. Losing the race drops the
//! in-flight future and surfaces `RelayError::Cancelled`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, Result};

/// Runs `fut` until it completes, `cancel` fires, or `deadline` elapses.
pub(crate) async fn run_cancellable<F, T>(
    cancel: &CancellationToken,
    deadline: Option<Duration>,
    what: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let guarded = async {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled {
                reason: format!("{what} cancelled by caller"),
            }),
            out = fut => out,
        }
    };

    match deadline {
        Some(limit) => tokio::time::timeout(limit, guarded)
            .await
            .unwrap_or_else(|_| {
                Err(RelayError::Cancelled {
                    reason: format!("{what} exceeded deadline of {limit:?}"),
                })
            }),
        None => guarded.await,
    }
}

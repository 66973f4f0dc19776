//! Entry point for the score relay.
//!
//! Loads `.env`, reads configuration from flags and environment, then serves
//! the relay route until Ctrl-C.
//!
//! Exit codes:
//! - 0: clean shutdown
//! - 1: startup failure (bind error, server error)
//! - 2: configuration error (clap handles this automatically)

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use score_relay::auth::TokenProvider;
use score_relay::client::SchoolClient;
use score_relay::config::Config;
use score_relay::score::ScoreFetcher;
use score_relay::server::{AppState, SCORE_ROUTE, router};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing .env is fine; everything may come from the real environment.
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("no .env loaded: {e}");
    }

    let config = Config::parse();

    let tokens = Arc::new(
        TokenProvider::new(
            &config.token_url(),
            &config.client_id,
            &config.client_secret,
            config.scope.as_deref(),
        )
        .with_expiry_buffer(config.token_expiry_buffer()),
    );

    let mut client = SchoolClient::new(tokens, &config.school_api_url);
    if let Some(deadline) = config.request_timeout() {
        client = client.with_timeout(deadline);
    }

    let shutdown = CancellationToken::new();
    let state = AppState {
        fetcher: Arc::new(ScoreFetcher::new(client)),
        default_query: config.default_query(),
        shutdown: shutdown.clone(),
    };

    let listener = match tokio::net::TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {e}", config.listen);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("relay listening on {}{}", config.listen, SCORE_ROUTE);

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await;

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}

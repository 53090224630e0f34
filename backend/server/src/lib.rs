//! Documentation of Fridge, a no-login social board.
//!
//! Users post short text or image updates, optionally with a poll. Others react,
//! reply in nested threads, gather posts into channels and report abuse.
//!
//!
//!
//! # General Infrastructure
//! - Browser talks to this server only, never to the backend directly
//! - Rows, RPC counters and the image bucket live on a hosted backend (see [`store`], [`blob`])
//! - Per-client memberships live in Redis (see [`membership`])
//! - Without `BACKEND_URL` or `REDIS_URL` everything is kept in memory, handy for local runs
//!
//!
//!
//! # Derived Views
//!
//! Nothing derived is ever stored. After every fetch or write the server
//! recomputes what it needs from the raw rows.
//!
//! - Reply threads: flat replies nested by `parent_id` (see [`thread`])
//! - Poll results: raw vote log counted per option (see [`tally`])
//!
//! Both are pure functions over rows that were already fetched. They never
//! fail; dangling parents turn into top-level replies and out-of-range votes
//! are skipped.
//!
//!
//!
//! # Notes
//!
//! ## Votes
//! Anyone can vote any number of times. The server remembers which polls a
//! client voted on (`hasVoted`) so the frontend can hide the buttons, but it
//! never refuses a vote because of it. Low-stakes anonymous polling.
//!
//! ## Reply depth
//! Threads can nest arbitrarily deep. The frontend caps visual indentation,
//! the data does not.
//!
//! ## Member counts
//! Joining twice from the same client only counts once. Clients that send no
//! `X-Client-Id` count on every call, same as before memberships were tracked
//! server side.
//!
//!
//!
//! # Setup
//!
//! Environment, all optional:
//! - `RUST_PORT` (8080)
//! - `BACKEND_URL`, with the `BACKEND_SERVICE_KEY` secret in `/run/secrets` or the env
//! - `STORAGE_BUCKET` (posts)
//! - `REDIS_URL`
//! - `PAGE_LIMIT` (8), `MAX_PAGE_LIMIT` (50), `MAX_UPLOAD_BYTES` (5 MiB)
//!
//! Run locally, fully in memory.
//! ```sh
//! RUST_LOG=info cargo run -p fridge
//! ```
//!
//! Seed a running server.
//! ```sh
//! cargo run -p tester -- http://localhost:8080 --posts 5
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, header::CONTENT_TYPE},
    routing::{get, post},
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod blob;
pub mod config;
pub mod error;
pub mod membership;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod tally;
pub mod thread;
pub mod utils;

use config::Config;
use routes::{
    create_channel_handler, create_channel_post_handler, create_post_handler,
    create_reply_handler, create_report_handler, get_poll_handler, join_channel_handler,
    joined_channels_handler, leave_channel_handler, list_channel_posts_handler,
    list_channels_handler, list_posts_handler, list_replies_handler, react_handler,
    reply_tree_handler, vote_handler,
};
use state::State;
use utils::CLIENT_ID_HEADER;

const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(CLIENT_ID_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes + FORM_OVERHEAD_BYTES);

    let board = Router::new()
        .route("/posts", get(list_posts_handler).post(create_post_handler))
        .route("/posts/{id}/reactions", post(react_handler))
        .route(
            "/posts/{id}/replies",
            get(list_replies_handler).post(create_reply_handler),
        )
        .route("/posts/{id}/replies/tree", get(reply_tree_handler))
        .route("/posts/{id}/polls", get(get_poll_handler).post(vote_handler))
        .route(
            "/channels",
            get(list_channels_handler).post(create_channel_handler),
        )
        .route("/channels/joined", get(joined_channels_handler))
        .route("/channels/{id}/join", post(join_channel_handler))
        .route("/channels/{id}/leave", post(leave_channel_handler))
        .route(
            "/channels/{id}/posts",
            get(list_channel_posts_handler).post(create_channel_post_handler),
        );

    Router::new()
        .nest("/api/no-login", board)
        .route("/api/reports", post(create_report_handler))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

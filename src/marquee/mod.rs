pub mod csrf;
pub mod dispatch;
pub mod guard;
pub mod handlers;
pub mod outcome;
pub mod password;
pub mod render;
pub mod routes;
pub mod session;
pub mod storage;
pub mod validator;

use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
    Router,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, Span};
use ulid::Ulid;

use self::{routes::RouteTable, storage::sessions::SessionStore};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared by every request.
#[derive(Debug)]
pub struct AppState {
    pub pool: PgPool,
    pub sessions: SessionStore,
    pub routes: RouteTable,
    pub globals: GlobalArgs,
}

impl AppState {
    /// # Errors
    /// Returns an error if the route table fails to compile.
    pub fn new(pool: PgPool, sessions: SessionStore, globals: GlobalArgs) -> Result<Self> {
        Ok(Self {
            pool,
            sessions,
            routes: RouteTable::new().context("Failed to compile route table")?,
            globals,
        })
    }
}

/// Build the application router: `/health` plus the page dispatcher for
/// everything else.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .fallback(dispatch::dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: SecretString, globals: GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    storage::migrate(&pool).await?;

    let sessions = SessionStore::postgres(
        pool.clone(),
        Duration::from_secs(globals.session_ttl_seconds),
    );
    let state = Arc::new(AppState::new(pool, sessions, globals)?);

    spawn_session_purge(state.clone());

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Gracefully shutdown"),
                Err(err) => {
                    error!("Failed to listen for shutdown signal: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}

fn spawn_session_purge(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match state.sessions.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "expired sessions removed"),
                Err(err) => error!("failed to purge sessions: {err:#}"),
            }
        }
    });
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = request.uri().path(),
        request_id
    )
}

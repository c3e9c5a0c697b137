//! HTTP transport for the query core.

use std::{
    collections::BTreeMap,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use axum::{
    extract::{Path, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, task};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::activity::{
    ActivityFanout, ActivityStats, CounterActivity, SessionToken, TracingActivity,
};
use crate::challenges::{
    attempt_challenge, challenge, challenge_levels, sample_queries, Challenge, ChallengeAttempt,
    ChallengeError, ChallengeLevel, SampleQueries,
};
use crate::query::errors::ErrorPayload;
use crate::query::{analyze, ExecError, PageEnvelope, QueryError, QueryInsights, Rejection};
use crate::service::{QueryRequest, QueryService, ServiceError, ServiceSettings};
use crate::store::{ColumnDef, Store, StoreError, StoreOptions};

/// Header carrying the caller's opaque session token.
pub const SESSION_HEADER: &str = "x-session-token";

/// Runtime options used to boot the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Path to the database file queries run against.
    pub db_path: PathBuf,
    /// Connection pool and deadline options.
    pub store: StoreOptions,
    /// Page size and count policy.
    pub settings: ServiceSettings,
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Allowed CORS origins.
    pub allow_origins: Vec<String>,
}

impl ServerOptions {
    /// Convenience accessor for `(host, port)` tuples.
    pub fn socket_parts(&self) -> (IpAddr, u16) {
        (self.host, self.port)
    }
}

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Opening the database failed.
    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),
    /// Binding or serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type AppState = Arc<ServerState>;

struct ServerState {
    service: QueryService,
    counters: Arc<CounterActivity>,
    started: Instant,
}

/// Opens the store and serves until ctrl-c.
pub async fn serve(options: ServerOptions) -> Result<(), ServerError> {
    install_tracing_subscriber();

    let (host, port) = options.socket_parts();
    let store = Arc::new(Store::open(&options.db_path, options.store.clone())?);
    let service = QueryService::new(store, options.settings);
    let app = build_router(service, &options.allow_origins);
    let addr = SocketAddr::from((host, port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        db_path = %options.db_path.display(),
        timeout_secs = options.store.timeout.as_secs(),
        page_size = options.settings.default_page_size.get(),
        allow_origins = ?options.allow_origins,
        "server listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds the router around `service`.
///
/// Activity is counted for `/api/stats` and logged through `tracing`; any sink
/// already installed on `service` is replaced.
pub fn build_router(service: QueryService, allow_origins: &[String]) -> Router {
    let counters = Arc::new(CounterActivity::default());
    let activity = ActivityFanout::default()
        .with(counters.clone())
        .with(Arc::new(TracingActivity));
    let state = Arc::new(ServerState {
        service: service.with_activity(Arc::new(activity)),
        counters,
        started: Instant::now(),
    });

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/query", post(query_handler))
        .route("/api/schema", get(schema_handler))
        .route("/api/tables", get(tables_handler))
        .route("/api/sample-data/:table", get(sample_data_handler))
        .route("/api/sample-queries", get(sample_queries_handler))
        .route("/api/challenges", get(challenges_handler))
        .route("/api/challenges/:id", get(challenge_handler))
        .route("/api/challenges/:id/attempt", post(attempt_handler))
        .route("/api/stats", get(stats_handler));

    if let Some(layer) = build_cors_layer(allow_origins) {
        router = router.layer(layer);
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let normalized = normalize_origin(origin);
            let value = normalized
                .as_deref()
                .and_then(|value| HeaderValue::from_str(value).ok());
            if value.is_none() {
                tracing::warn!(%origin, ?normalized, "ignoring invalid CORS origin");
            }
            value
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([ACCEPT, CONTENT_TYPE, HeaderName::from_static(SESSION_HEADER)]),
    )
}

fn normalize_origin(origin: &str) -> Option<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let store = Arc::clone(state.service.store());
    let database = match task::spawn_blocking(move || store.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(err.to_string()),
    };
    let healthy = database.is_ok();
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        service: "sqlquiz",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        checks: HealthChecks {
            database: database.err().unwrap_or_else(|| "ok".to_string()),
        },
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, AppError> {
    let request = QueryRequest {
        text: body.query,
        page: body.page,
        page_size: body.page_size,
        session: session_from(&headers),
    };
    let service = state.service.clone();
    let page = task::spawn_blocking(move || {
        let page = service.run_query(&request)?;
        let elapsed = Duration::from_secs_f64(page.execution_time_ms / 1000.0);
        let insights = analyze(&request.text, elapsed);
        Ok::<_, QueryError>(QueryResponse { page, insights })
    })
    .await??;
    Ok(Json(page))
}

async fn schema_handler(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<ColumnDef>>>, AppError> {
    let service = state.service.clone();
    let schema = task::spawn_blocking(move || service.catalog().schema()).await??;
    Ok(Json(
        schema
            .into_iter()
            .map(|table| (table.name, table.columns))
            .collect(),
    ))
}

async fn tables_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let service = state.service.clone();
    let tables = task::spawn_blocking(move || service.catalog().tables()).await??;
    Ok(Json(tables))
}

async fn sample_data_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PageEnvelope>, AppError> {
    let service = state.service.clone();
    let session = session_from(&headers);
    let page = task::spawn_blocking(move || service.sample_data(&table, session)).await??;
    Ok(Json(page))
}

async fn sample_queries_handler(
    State(state): State<AppState>,
) -> Result<Json<SampleQueries>, AppError> {
    let service = state.service.clone();
    let samples = task::spawn_blocking(move || sample_queries(service.catalog())).await??;
    Ok(Json(samples))
}

async fn challenges_handler() -> Json<Vec<ChallengeLevel>> {
    Json(challenge_levels())
}

async fn challenge_handler(Path(id): Path<u32>) -> Result<Json<&'static Challenge>, AppError> {
    Ok(Json(challenge(id)?))
}

async fn attempt_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    headers: HeaderMap,
    Json(body): Json<AttemptBody>,
) -> Result<Json<ChallengeAttempt>, AppError> {
    challenge(id)?;
    if body.query.trim().is_empty() {
        return Err(QueryError::from(Rejection::EmptyQuery).into());
    }
    let service = state.service.clone();
    let session = session_from(&headers);
    let attempt = task::spawn_blocking(move || {
        attempt_challenge(&service, id, &body.query, body.hints_used, session)
    })
    .await??;
    Ok(Json(attempt))
}

async fn stats_handler(State(state): State<AppState>) -> Json<ActivityStats> {
    Json(state.counters.snapshot())
}

fn session_from(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SessionToken::new)
}

/// HTTP status for a query core error.
pub fn status_for(err: &QueryError) -> StatusCode {
    match err {
        QueryError::Rejected(_) => StatusCode::BAD_REQUEST,
        QueryError::Failed(ExecError::SyntaxError(_)) => StatusCode::BAD_REQUEST,
        QueryError::Failed(ExecError::Timeout { .. }) => StatusCode::REQUEST_TIMEOUT,
        QueryError::Failed(ExecError::RuntimeError(_)) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    query: String,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AttemptBody {
    #[serde(default)]
    query: String,
    #[serde(default)]
    hints_used: u32,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    #[serde(flatten)]
    page: PageEnvelope,
    insights: QueryInsights,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    database: String,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error("internal task failure: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Query(err) => AppError::Query(err),
            ServiceError::Store(err) => AppError::Store(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match &self {
            AppError::Query(err) => (status_for(err), err.payload()),
            AppError::Store(StoreError::UnknownTable(_)) => (
                StatusCode::BAD_REQUEST,
                ErrorPayload {
                    error: "InvalidTable",
                    message: self.to_string(),
                },
            ),
            AppError::Challenge(ChallengeError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                ErrorPayload {
                    error: "ChallengeNotFound",
                    message: self.to_string(),
                },
            ),
            AppError::Store(err) => {
                tracing::error!(%err, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorPayload {
                        error: "StoreError",
                        message: self.to_string(),
                    },
                )
            }
            AppError::Join(err) => {
                tracing::error!(%err, "blocking task failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorPayload {
                        error: "Internal",
                        message: self.to_string(),
                    },
                )
            }
        };
        (status, Json(payload)).into_response()
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

/// Installs the global `fmt` subscriber once, honouring `RUST_LOG`.
pub fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
    });
}

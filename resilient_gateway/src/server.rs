//! HTTP server exposing the task and user facades under `/web-client`.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, instrument};

use crate::{
    breaker::{CircuitSnapshot, CircuitState},
    cache::CacheStats,
    error::ServiceError,
    middleware::{
        create_body_limit_layer, create_cors_layer, create_rate_limiter,
        rate_limit_middleware, request_logging_middleware,
    },
    model::{EntityId, Task, TaskRequest, User, UserRequest},
    service::Gateway,
    settings::Settings,
};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub settings: Arc<Settings>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Gateway, settings: Settings) -> Self {
        Self {
            gateway,
            settings: Arc::new(settings),
            started_at: Instant::now(),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    circuits: Vec<CircuitStatus>,
    caches: Vec<CacheStats>,
}

#[derive(Serialize)]
struct CircuitStatus {
    name: String,
    state: CircuitState,
}

/// `?id=` query used by the task lookup route
#[derive(Debug, Deserialize)]
struct IdQuery {
    id: EntityId,
}

/// Create the HTTP router with all endpoints and middleware
pub fn create_router(state: AppState) -> Router {
    let security = &state.settings.security;
    let cors_layer = create_cors_layer(security);
    let body_limit_layer = create_body_limit_layer(security.max_request_size_mb);
    let timeout_layer = TimeoutLayer::new(Duration::from_secs(
        state.settings.server.request_timeout_seconds,
    ));
    let rate_limiter = create_rate_limiter(security);

    let web_client = Router::new()
        .route("/get-tasks", get(get_all_tasks))
        .route("/get-task", get(get_task_by_id))
        .route("/create-task", post(create_task))
        .route("/update-task", put(update_task))
        .route("/delete-task/:id", delete(delete_task))
        .route("/get-users", get(get_all_users))
        .route("/get-user/:id", get(get_user_by_id))
        .route("/create-user", post(create_user))
        .route("/update-user", put(update_user))
        .route("/delete-user/:id", delete(delete_user));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/circuits", get(list_circuits))
        .nest("/web-client", web_client)
        .with_state(state);

    if let Some(rate_limiter) = rate_limiter {
        app = app.layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));
    }

    app.layer(timeout_layer)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors_layer)
        .layer(body_limit_layer)
}

/// Health check endpoint; degraded while any circuit is not closed
#[instrument(skip(state))]
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = &state.gateway;
    let circuits: Vec<CircuitStatus> = gateway
        .breakers
        .snapshots()
        .into_iter()
        .map(|snapshot| CircuitStatus {
            name: snapshot.name,
            state: snapshot.state,
        })
        .collect();

    let status = if circuits.iter().all(|c| c.state == CircuitState::Closed) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        circuits,
        caches: vec![gateway.tasks.cache_stats(), gateway.users.cache_stats()],
    })
}

/// Per-circuit state and counters
#[instrument(skip(state))]
async fn list_circuits(State(state): State<AppState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.gateway.breakers.snapshots())
}

#[instrument(skip(state))]
async fn get_all_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ServiceError> {
    info!("Received request to get all tasks");
    state.gateway.tasks.list().await.map(Json)
}

#[instrument(skip(state))]
async fn get_task_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Task>, ServiceError> {
    info!(id = query.id, "Received request to get task by ID");
    state.gateway.tasks.get_by_id(query.id).await.map(Json)
}

#[instrument(skip(state))]
async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<Task>, ServiceError> {
    info!(title = %request.task_title, "Received request to create a task");
    state.gateway.tasks.create(&request).await.map(Json)
}

#[instrument(skip(state))]
async fn update_task(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<Task>, ServiceError> {
    info!(id = ?request.task_id, title = %request.task_title, "Received request to update a task");
    state.gateway.tasks.update(&request).await.map(Json)
}

#[instrument(skip(state))]
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> Result<StatusCode, ServiceError> {
    info!(id, "Received request to delete task");
    state.gateway.tasks.delete(id).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
async fn get_all_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ServiceError> {
    info!("Received request to get all users");
    state.gateway.users.list().await.map(Json)
}

#[instrument(skip(state))]
async fn get_user_by_id(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> Result<Json<User>, ServiceError> {
    info!(id, "Received request to get user by ID");
    state.gateway.users.get_by_id(id).await.map(Json)
}

#[instrument(skip(state))]
async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<Json<User>, ServiceError> {
    info!(email = %request.user_email, "Received request to create a user");
    state.gateway.users.create(&request).await.map(Json)
}

#[instrument(skip(state))]
async fn update_user(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<Json<User>, ServiceError> {
    info!(id = ?request.user_id, email = %request.user_email, "Received request to update a user");
    state.gateway.users.update(&request).await.map(Json)
}

#[instrument(skip(state))]
async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> Result<StatusCode, ServiceError> {
    info!(id, "Received request to delete user");
    state.gateway.users.delete(id).await?;
    Ok(StatusCode::OK)
}

/// Start the HTTP server and wait for shutdown signal
pub async fn serve(settings: Settings) -> Result<()> {
    let gateway = Gateway::from_settings(&settings)?;
    let addr = settings.bind_address();
    let app = create_router(AppState::new(gateway, settings));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
    {
        error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}

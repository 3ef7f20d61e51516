mod cache;
mod config;
mod crosslisting;
mod error;
mod http;
mod idempotency;
mod jobs;
mod llm;
mod metrics;
mod models;
mod platforms;
mod publisher;
mod ratelimit;
mod security;
mod store;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Extension, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use cache::{MemoryCache, RedisCache, SharedCache};
use config::{AppConfig, ProcessingMode};
use crosslisting::{CrossListingService, Dispatch, HistoryParams};
use error::CrossListError;
use eyre::{WrapErr, eyre};
use idempotency::IdempotencyCache;
use jobs::JobQueue;
use llm::{LlmClient, LlmConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiEnvelope, AuthUser, CreateCrossListingPayload, CreateCrossListingResponse, HistoryResponse,
    InventoryItem, StatusResponse,
};
use platforms::Platform;
use publisher::{DescriptionWriter, PublisherRegistry};
use ratelimit::{FixedWindowLimiter, LockoutGuard};
use security::{
    AuthState, SessionResolver, StaticSessionResolver, SupabaseSessionResolver, require_auth,
};
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use store::{MemoryStore, Store, SupabaseStore, supabase::SupabaseClient};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "crosslist.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    let writer = Arc::new(DescriptionWriter::new(Arc::new(LlmClient::new(
        LlmConfig::from_env(),
    ))));
    let publishers = Arc::new(PublisherRegistry::simulated(&config.publisher, writer));
    let missing = publishers.missing_platforms();
    if !missing.is_empty() {
        return Err(eyre!("no publisher registered for {missing:?}"));
    }

    let (store, resolver): (Arc<dyn Store>, Arc<dyn SessionResolver>) =
        match SupabaseClient::from_env() {
            Some(client) => {
                info!(target = "crosslist.store", "using Supabase data store");
                (
                    Arc::new(SupabaseStore::new(client.clone())),
                    Arc::new(SupabaseSessionResolver::new(client)),
                )
            }
            None => {
                warn!(
                    target = "crosslist.store",
                    "SUPABASE_URL not set; using in-memory store with demo sessions"
                );
                let store = MemoryStore::new();
                let sessions = StaticSessionResolver::from_env();
                seed_demo_inventory(&store, &sessions).await;
                (Arc::new(store), Arc::new(sessions))
            }
        };

    let cache: Arc<dyn SharedCache> = match RedisCache::from_env() {
        Some(redis) => {
            info!(target = "crosslist.security", "using Redis for shared counters");
            Arc::new(redis)
        }
        None => Arc::new(MemoryCache::new()),
    };

    let mut service =
        CrossListingService::new(store.clone(), publishers, config.require_platform_credentials);
    match config.processing_mode {
        ProcessingMode::Queued => {
            let (queue, _worker) = JobQueue::spawn(service.processor(), config.queue_capacity);
            queue
                .recover(store.as_ref())
                .await
                .wrap_err("recovering unfinished requests")?;
            service = service.with_dispatch(Dispatch::Queued(queue));
        }
        ProcessingMode::Inline => {
            service
                .processor()
                .resume_unfinished()
                .await
                .wrap_err("resuming unfinished requests")?;
        }
    }

    let prometheus_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(target = "crosslist.metrics", error = %err, "prometheus recorder unavailable");
            None
        }
    };

    let state = AppState {
        service: Arc::new(service),
        idempotency: IdempotencyCache::new(
            cache.clone(),
            Duration::from_secs(config.idempotency_ttl_secs),
        ),
        openapi: Arc::new(load_openapi()),
        prometheus_handle,
        metrics_key: std::env::var("METRICS_KEY").ok(),
        docs_key: std::env::var("OPENAPI_KEY").ok(),
    };
    let auth = AuthState::new(
        resolver,
        FixedWindowLimiter::new(
            cache.clone(),
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        ),
        LockoutGuard::new(
            cache,
            config.lockout_max_attempts,
            Duration::from_secs(config.lockout_window_secs),
        ),
    );
    let app = build_router(state, auth, config.request_max_bytes);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "crosslist.api", mode = ?config.processing_mode, "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    service: Arc<CrossListingService>,
    idempotency: IdempotencyCache,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: Option<PrometheusHandle>,
    metrics_key: Option<String>,
    docs_key: Option<String>,
}

fn build_router(state: AppState, auth: AuthState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/crosslisting/create", post(create_crosslisting))
        .route("/crosslisting/status", get(crosslisting_status))
        .route("/crosslisting/history", get(crosslisting_history))
        .route_layer(middleware::from_fn_with_state(auth, require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

fn load_openapi() -> serde_json::Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

/// Gives every demo session a few active items and credentials for every
/// platform so the API is usable without a hosted store.
async fn seed_demo_inventory(store: &MemoryStore, sessions: &StaticSessionResolver) {
    let samples = [
        ("Nike Air Max 90", "Nike", "Sneakers", 120.0),
        ("Patagonia Better Sweater", "Patagonia", "Outerwear", 85.0),
        ("Levi's 501 Original Jeans", "Levi's", "Denim", 45.0),
    ];
    for user in sessions.users() {
        for platform in Platform::ALL {
            store.grant_credential(user.id, platform).await;
        }
        for (title, brand, category, price) in samples {
            let item = InventoryItem {
                id: Uuid::new_v4(),
                user_id: user.id,
                title: title.to_string(),
                description: None,
                brand: Some(brand.to_string()),
                category: Some(category.to_string()),
                condition: Some("Pre-owned".to_string()),
                size: None,
                retail_price: price,
                quantity_available: 1,
                status: "active".to_string(),
                images: vec![],
            };
            info!(target = "crosslist.store", user_id = %user.id, item_id = %item.id, title, "seeded demo item");
            store.put_inventory_item(item).await;
        }
    }
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "crosslist-api-rs",
    }))
}

fn presented<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, CrossListError> {
    if let Some(key) = &state.docs_key
        && presented(&headers, "X-Docs-Key") != key
    {
        return Err(CrossListError::unauthorized(
            "docs_unauthorized",
            "Provide a valid X-Docs-Key header",
        ));
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Cross-Listing API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key
        && presented(&headers, "X-Metrics-Key") != secret
    {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    match &state.prometheus_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Validate, record and process a cross-listing request.
///
/// - Method: `POST`
/// - Path: `/crosslisting/create`
/// - Auth: `Authorization: Bearer <token>`
/// - Headers: optional `Idempotency-Key`
/// - Response: 201 with `requestId`, `status` and `estimatedCompletionTime`
async fn create_crosslisting(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateCrossListingPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiEnvelope<CreateCrossListingResponse>>), CrossListError> {
    metrics::inc_requests("/crosslisting/create");
    let Json(payload) =
        payload.map_err(|rejection| CrossListError::validation("invalid_body", rejection.body_text()))?;

    let key = idempotency_key(&headers);
    if let Some(key) = &key
        && let Some(existing) = state.idempotency.lookup(user.id, key).await
    {
        info!(target = "crosslist.api", request_id = %existing.request_id, "idempotent_replay");
        return Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(existing))));
    }

    let response = state.service.create(&user, &payload).await?;
    if let Some(key) = &key {
        state.idempotency.remember(user.id, key, &response).await;
    }
    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(response))))
}

#[derive(Debug, Default, Deserialize)]
struct StatusParams {
    #[serde(rename = "requestId")]
    request_id: Option<String>,
}

/// Current state, progress and listings of one request.
///
/// - Method: `GET`
/// - Path: `/crosslisting/status?requestId=<uuid>`
async fn crosslisting_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Json<ApiEnvelope<StatusResponse>>, CrossListError> {
    metrics::inc_requests("/crosslisting/status");
    let Query(params) =
        params.map_err(|rejection| CrossListError::validation("invalid_query", rejection.body_text()))?;
    let status = state
        .service
        .status(&user, params.request_id.as_deref())
        .await?;
    Ok(Json(ApiEnvelope::ok(status)))
}

/// Paginated request history with status counts and monthly usage.
///
/// - Method: `GET`
/// - Path: `/crosslisting/history?page&limit&status&platform&sortBy&sortOrder`
async fn crosslisting_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<ApiEnvelope<HistoryResponse>>, CrossListError> {
    metrics::inc_requests("/crosslisting/history");
    let Query(params) =
        params.map_err(|rejection| CrossListError::validation("invalid_query", rejection.body_text()))?;
    let history = state.service.history(&user, params).await?;
    Ok(Json(ApiEnvelope::ok(history)))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

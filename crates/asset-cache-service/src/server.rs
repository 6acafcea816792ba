//! HTTP server for asset endpoints
//!
//! Provides /health and /assets/{id} (GET, PUT, DELETE) plus
//! /assets/{id}/metadata.

use crate::error::StoreError;
use crate::orchestrator::StoreOrchestrator;
use crate::types::{HealthResponse, StoreOutcome};
use asset_record::{AssetFlags, AssetId, AssetMetadata, AssetRecord};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub orchestrator: Arc<StoreOrchestrator>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<StoreOrchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct StoreResponse {
    id: AssetId,
    outcome: StoreOutcome,
}

/// Query parameters for PUT /assets/{id}
#[derive(Debug, Default, Deserialize)]
pub struct StoreParams {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<i8>,
    pub local: Option<bool>,
    pub temporary: Option<bool>,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/assets/{id}",
            get(get_asset).put(put_asset).delete(delete_asset),
        )
        .route("/assets/{id}/metadata", get(get_metadata))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once a shutdown signal was handled
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Could not listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        stats: state.orchestrator.stats(),
    })
}

async fn get_asset(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.orchestrator.request_asset(id).await {
        Ok(Some(record)) => {
            let mut headers = metadata_headers(&record.metadata());
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            (StatusCode::OK, headers, Body::from(record.data)).into_response()
        }
        Ok(None) => not_found(id),
        Err(e) => store_error_response(id, e),
    }
}

async fn get_metadata(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.orchestrator.request_asset_metadata(id).await {
        Ok(Some(metadata)) => Json(metadata).into_response(),
        Ok(None) => not_found(id),
        Err(e) => store_error_response(id, e),
    }
}

async fn put_asset(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<StoreParams>,
    body: Bytes,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let record = AssetRecord::new(id, params.asset_type.unwrap_or_default(), body)
        .with_name(params.name.unwrap_or_default())
        .with_description(params.description.unwrap_or_default())
        .with_flags(AssetFlags {
            local: params.local.unwrap_or(false),
            temporary: params.temporary.unwrap_or(false),
        });

    match state.orchestrator.store_asset(record).await {
        Ok(outcome) => {
            let status = match outcome {
                StoreOutcome::Stored => StatusCode::CREATED,
                StoreOutcome::Queued => StatusCode::ACCEPTED,
            };
            (status, Json(StoreResponse { id, outcome })).into_response()
        }
        Err(e) => store_error_response(id, e),
    }
}

async fn delete_asset(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.orchestrator.purge_asset(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(id),
        Err(e) => store_error_response(id, e),
    }
}

fn parse_id(raw: &str) -> Result<AssetId, Response> {
    raw.parse::<AssetId>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

fn metadata_headers(metadata: &AssetMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: String| {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => warn!(id = %metadata.id, header = name, "Skipping header with invalid value"),
        }
    };

    put("x-asset-id", metadata.id.to_string());
    put("x-asset-type", metadata.asset_type.to_string());
    put("x-asset-name", urlencoding::encode(&metadata.name).into_owned());
    put(
        "x-asset-description",
        urlencoding::encode(&metadata.description).into_owned(),
    );
    put("x-asset-local", metadata.flags.local.to_string());
    put("x-asset-temporary", metadata.flags.temporary.to_string());
    put("x-asset-created", metadata.create_time.to_rfc3339());
    headers
}

fn not_found(id: AssetId) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("Asset {} not found", id))
}

fn store_error_response(id: AssetId, err: StoreError) -> Response {
    let status = match &err {
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Rejected(_) => StatusCode::BAD_GATEWAY,
        StoreError::Durability(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::InvalidAsset(_) => StatusCode::BAD_REQUEST,
    };
    if status.is_server_error() {
        warn!(id = %id, error = %err, "Asset request failed");
    }
    error_response(status, err.to_string())
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

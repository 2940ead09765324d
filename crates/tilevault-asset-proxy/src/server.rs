//! HTTP wiring of the interception surface
//!
//! A catch-all route maps every incoming request to an interception
//! decision; the reserved `/__tilevault/` prefix carries the health and
//! control-message endpoints. Pass-through traffic is forwarded to the
//! network and returned untouched.

use crate::fetcher::NetworkFetcher;
use crate::lifecycle::AssetProxy;
use crate::types::{
    AssetRequest, AssetSnapshot, ControlMessage, Destination, FetchOutcome, HealthResponse,
};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use url::Url;

/// Shared state for the HTTP server
pub struct ServerState {
    pub proxy: AssetProxy,
    pub fetcher: Arc<dyn NetworkFetcher>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(proxy: AssetProxy, fetcher: Arc<dyn NetworkFetcher>) -> Self {
        Self {
            proxy,
            fetcher,
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
struct MessageResponse {
    status: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/__tilevault/health", get(health))
        .route("/__tilevault/message", post(message))
        .fallback(intercept)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache = state.proxy.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        phase: state.proxy.phase().await.to_string(),
        generation: state.proxy.generation().to_string(),
        uptime_secs,
        cache,
    })
}

/// Control message endpoint: `{"type": "SKIP_WAITING"}`
async fn message(
    State(state): State<SharedState>,
    Json(message): Json<ControlMessage>,
) -> Response {
    match state.proxy.handle_message(message).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                status: "ok".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "control message failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "control message failed".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Catch-all interception handler
async fn intercept(State(state): State<SharedState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(asset_request) =
        to_asset_request(&parts, &state.proxy.manifest().upstream_origin)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "unparseable request URL".to_string(),
            }),
        )
            .into_response();
    };

    match state.proxy.handle_fetch(&asset_request).await {
        Ok(FetchOutcome::Served {
            snapshot,
            from_cache,
        }) => snapshot_response(snapshot, Some(from_cache)),
        Ok(FetchOutcome::PassThrough) => pass_through(&state, &asset_request, body).await,
        Err(err) => {
            warn!(url = %asset_request.url, error = %err, "asset request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "upstream unreachable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Forward pass-through traffic with its body and return the response
/// untouched (no caching, no cache headers).
async fn pass_through(state: &ServerState, request: &AssetRequest, body: Body) -> Response {
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => {
            warn!(url = %request.url, error = %err, "failed to read request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "unreadable request body".to_string(),
                }),
            )
                .into_response();
        }
    };

    match state.fetcher.forward(request, body).await {
        Ok(snapshot) => snapshot_response(snapshot, None),
        Err(err) => {
            warn!(url = %request.url, error = %err, "pass-through fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "upstream unreachable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Map an incoming HTTP request onto the interception model. Origin-form
/// paths resolve against the upstream origin; absolute-form URIs (proxy
/// style) are taken as-is.
fn to_asset_request(parts: &Parts, upstream: &Url) -> Option<AssetRequest> {
    let raw = parts.uri.to_string();
    let url = if parts.uri.scheme().is_some() {
        Url::parse(&raw).ok()?
    } else {
        upstream.join(&raw).ok()?
    };
    Some(AssetRequest {
        method: parts.method.clone(),
        url,
        destination: destination_from_headers(&parts.headers),
    })
}

/// `Sec-Fetch-Dest: document` marks a top-level navigation; absent that
/// header, an `Accept: text/html` sniff stands in.
fn destination_from_headers(headers: &HeaderMap) -> Destination {
    if let Some(dest) = headers.get("sec-fetch-dest").and_then(|v| v.to_str().ok()) {
        return if dest == "document" {
            Destination::Document
        } else {
            Destination::Other
        };
    }
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);
    if accepts_html {
        Destination::Document
    } else {
        Destination::Other
    }
}

fn snapshot_response(snapshot: AssetSnapshot, from_cache: Option<bool>) -> Response {
    let status = StatusCode::from_u16(snapshot.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, snapshot.content_type);
    if let Some(from_cache) = from_cache {
        builder = builder.header("X-Cache", if from_cache { "HIT" } else { "MISS" });
    }
    builder.body(Body::from(snapshot.body)).unwrap()
}

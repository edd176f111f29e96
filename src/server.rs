use crate::config::ServerConfig;
use crate::error::Result as ScraperResult;
use crate::error::ScraperError;
use crate::storage::{AuctionQuery, SortField, SortOrder, Storage};
use crate::types::AuctionRecord;
use axum::{
    extract::Query,
    http::{Method, StatusCode},
    response::Json,
    routing::get,
    Extension, Router,
};
use chrono::{Duration as ChronoDuration, Local};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    storage: Arc<dyn Storage>,
    recent_window_days: i64,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    #[serde(rename = "pageSize")]
    page_size: Option<u32>,
    #[serde(rename = "sortField")]
    sort_field: Option<String>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountParams {
    search: Option<String>,
}

/// Health check endpoint
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "auction-scraper-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_auctions(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AuctionRecord>>, StatusCode> {
    // Sort inputs are resolved through allow-lists; unrecognized values are
    // rejected rather than interpolated.
    let sort_field = match params.sort_field.as_deref() {
        None => SortField::AuctionId,
        Some(name) => SortField::from_api_name(name).ok_or(StatusCode::BAD_REQUEST)?,
    };
    let sort_order = match params.sort_order.as_deref() {
        None => SortOrder::Asc,
        Some(name) => SortOrder::from_api_name(name).ok_or(StatusCode::BAD_REQUEST)?,
    };

    let query = AuctionQuery {
        page: params.page.unwrap_or(1).max(1),
        page_size: params.page_size.unwrap_or(10).clamp(1, 500),
        sort_field,
        sort_order,
        search: params.search.filter(|s| !s.trim().is_empty()),
        crawled_since: Local::now().naive_local()
            - ChronoDuration::days(state.recent_window_days),
    };

    state
        .storage
        .query_auctions(&query)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn count_auctions(
    Extension(state): Extension<AppState>,
    Query(params): Query<CountParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let crawled_since =
        Local::now().naive_local() - ChronoDuration::days(state.recent_window_days);
    let search = params.search.filter(|s| !s.trim().is_empty());

    let total_count = state
        .storage
        .count_auctions(search.as_deref(), crawled_since)
        .await
        .map_err(internal_error)?;

    Ok(Json(serde_json::json!({ "total_count": total_count })))
}

/// Storage failures surface as a generic 500 with no detail.
fn internal_error(e: ScraperError) -> StatusCode {
    error!("Error while querying the database: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Create the HTTP server with all routes.
pub fn create_server(storage: Arc<dyn Storage>, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let state = AppState {
        storage,
        recent_window_days: config.recent_window_days,
    };

    Router::new()
        .route("/health", get(health))
        .route("/auctions", get(list_auctions))
        .route("/auctions/count", get(count_auctions))
        .layer(Extension(state))
        .layer(cors)
}

/// Bind and serve until shutdown.
pub async fn run_server(storage: Arc<dyn Storage>, config: &ServerConfig) -> ScraperResult<()> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| ScraperError::Config(format!("invalid bind address: {e}")))?;

    let app = create_server(storage, config);
    info!("Read API listening on {}", addr);

    hyper::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| ScraperError::Config(format!("server error: {e}")))?;

    Ok(())
}

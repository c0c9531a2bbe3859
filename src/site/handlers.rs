use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::path::PagePath;
use super::static_files::{not_found, serve_file};
use crate::analytics::{extract_client_ip, AnalyticsAggregator, AnalyticsSnapshot};
use crate::config::AnalyticsConfig;
use crate::dashboard::{self, ServerStats};

pub struct SiteState {
    pub build_dir: PathBuf,
    pub aggregator: Arc<AnalyticsAggregator>,
    pub analytics_config: AnalyticsConfig,
    pub started_at: Instant,
}

/// Serve a compiled page and count the view.
///
/// Installed as the router fallback, so it sees every path not claimed by
/// `/assets`, `/favicon.ico` or the analytics routes.
pub async fn serve_page(
    State(state): State<Arc<SiteState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, HeaderValue::from_static("GET, HEAD"))],
            "Method not allowed",
        )
            .into_response();
    }

    let Some(page) = PagePath::parse(uri.path()) else {
        debug!(path = uri.path(), "rejected request path");
        return not_found();
    };

    let response = serve_file(&page.artifact(&state.build_dir), method == Method::HEAD).await;

    if response.status() == StatusCode::OK && method == Method::GET {
        record_view(&state, &page, addr, &headers);
    }

    response
}

/// Hand the view to the aggregator without holding up the response; the
/// country lookup may take as long as the geolocation timeout.
fn record_view(state: &Arc<SiteState>, page: &PagePath, addr: SocketAddr, headers: &HeaderMap) {
    if !state.analytics_config.enabled {
        return;
    }

    let identity = extract_client_ip(headers, addr.ip(), &state.analytics_config).to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let path = page.analytics_key();
    let aggregator = Arc::clone(&state.aggregator);

    tokio::spawn(async move {
        aggregator.record_view(&identity, &path, &user_agent).await;
    });
}

/// Analytics dashboard
pub async fn dashboard(State(state): State<Arc<SiteState>>) -> Response {
    let snapshot = state.aggregator.snapshot();
    let stats = ServerStats::collect(state.started_at.elapsed());
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Html(dashboard::render(&snapshot, &stats)),
    )
        .into_response()
}

/// Raw counters behind the dashboard
pub async fn analytics_data(State(state): State<Arc<SiteState>>) -> Json<AnalyticsSnapshot> {
    Json(state.aggregator.snapshot())
}

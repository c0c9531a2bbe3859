use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Instant;
use tower_http::services::{ServeDir, ServeFile};

use crate::analytics::AnalyticsAggregator;
use crate::auth::{auth_middleware, AuthService};
use crate::config::{AnalyticsConfig, SiteConfig};

use super::handlers::{analytics_data, dashboard, serve_page, SiteState};

/// Build the public router.
///
/// Needs `into_make_service_with_connect_info::<SocketAddr>()` (or a
/// `MockConnectInfo` layer in tests) since page views are keyed by peer address.
pub fn create_site_router(
    site: &SiteConfig,
    analytics_config: AnalyticsConfig,
    aggregator: Arc<AnalyticsAggregator>,
    auth_service: Arc<AuthService>,
) -> Router {
    let state = Arc::new(SiteState {
        build_dir: site.build_dir.clone(),
        aggregator,
        analytics_config,
        started_at: Instant::now(),
    });

    let analytics_routes = Router::new()
        .route("/analytics", get(dashboard))
        .route("/analytics/data", get(analytics_data))
        .route_layer(middleware::from_fn(move |headers, req, next| {
            let auth = Arc::clone(&auth_service);
            auth_middleware(auth, headers, req, next)
        }));

    Router::new()
        .merge(analytics_routes)
        .nest_service("/assets", ServeDir::new(&site.assets_dir))
        .route_service("/favicon.ico", ServeFile::new(&site.favicon_path))
        .fallback(serve_page)
        .with_state(state)
}

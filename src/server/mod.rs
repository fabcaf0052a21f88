pub mod api;
pub mod dtos;
pub mod error;
pub mod services;
pub mod utils;

pub use services::ProxyServices;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Extension, Router,
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use once_cell::sync::Lazy;
use tracing::info;

use crate::{
    config::AppConfig,
    registry::{DynChannelsRepository, RedisDatabase},
};

use api::{health_controller, proxy_controller::ProxyController};

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(
        config: Arc<AppConfig>,
        channels: DynChannelsRepository,
        redis: Option<Arc<RedisDatabase>>,
    ) -> anyhow::Result<()> {
        // start the uptime clock before the first request lands
        Lazy::force(&STARTED_AT);

        let port = config.port;
        let services = ProxyServices::new(channels, redis, config);
        let app = Self::router(services);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!("proxy listening on port {}", port);

        axum::serve(listener, app).await?;

        Ok(())
    }

    /// the full application router; public so integration tests can mount
    /// it on an ephemeral listener
    pub fn router(services: ProxyServices) -> Router {
        Router::new()
            .nest("/api/proxy", ProxyController::app())
            .route("/api/health", get(health_controller::health_endpoint))
            .layer(middleware::from_fn(cors_middleware))
            .layer(Extension(services))
    }
}

/// every response carries the permissive CORS set so web players on any
/// origin can pull playlists and segments
fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Type, Content-Range"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
}

/// preflights short-circuit to 204; everything else flows through and gets
/// the CORS headers stamped on, errors included
async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors(response.headers_mut());
    response
}

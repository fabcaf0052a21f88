use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::error;

use crate::server::dtos::health_dto::{
    HealthResponse, HealthStatus, RegistryHealth, ServiceHealthDetails,
};
use crate::server::services::proxy_services::ProxyServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// service liveness - pings redis when the registry lives there, the
/// file-backed registry has nothing that can fail
pub async fn health_endpoint(
    Extension(services): Extension<ProxyServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let registry_health = check_registry_health(&services).await;

    let overall_status = registry_health.status;

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            registry: registry_health,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_registry_health(services: &ProxyServices) -> RegistryHealth {
    let Some(redis) = &services.redis else {
        return RegistryHealth {
            status: HealthStatus::Healthy,
            backend: "file",
            response_time_ms: 0.0,
        };
    };

    match redis.ping().await {
        Ok(response_time) => RegistryHealth {
            status: HealthStatus::Healthy,
            backend: "redis",
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Redis health check failed: {}", e);
            RegistryHealth {
                status: HealthStatus::Unhealthy,
                backend: "redis",
                response_time_ms: 0.0,
            }
        }
    }
}

//! # voxcall-observability
//!
//! Observability-Crate fuer voxcall:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber (text oder JSON)
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::{logging_initialisieren, LogFormat};
pub use metrics::{metrics_router, VoxcallMetrics};
pub use middleware::{request_timing_layer, timing_middleware};

use axum::Router;

/// Router mit `/metrics` und `/health`, zum Einhaengen in den Hauptserver
pub fn observability_router(metriken: VoxcallMetrics, health: HealthState) -> Router {
    Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health))
}

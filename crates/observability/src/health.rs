//! Health-Check-Endpunkt fuer voxcall
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, laufenden Anrufen und
//! ob alle Sprach-Anbieter konfiguriert sind.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use prometheus::IntGauge;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_calls: i64,
    pub providers_configured: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    aktive_anrufe: IntGauge,
    anbieter_bereit: Arc<AtomicBool>,
    faehrt_herunter: Arc<AtomicBool>,
}

impl HealthState {
    /// `aktive_anrufe` ist die Gauge aus den Metriken
    pub fn neu(aktive_anrufe: IntGauge) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            aktive_anrufe,
            anbieter_bereit: Arc::new(AtomicBool::new(true)),
            faehrt_herunter: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn anbieter_bereit_setzen(&self, bereit: bool) {
        self.anbieter_bereit.store(bereit, Ordering::Relaxed);
    }

    /// Markiert den Server als herunterfahrend (Health meldet 503)
    pub fn herunterfahren(&self) {
        self.faehrt_herunter.store(true, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        if self.faehrt_herunter.load(Ordering::Relaxed) {
            HealthStatus::Unhealthy
        } else if self.anbieter_bereit.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            active_calls: self.aktive_anrufe.get(),
            providers_configured: self.anbieter_bereit.load(Ordering::Relaxed),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let antwort = state.antwort();
    let http_status = match antwort.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // 200 auch bei degraded, der Health-Check des Loadbalancers bleibt gruen
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(antwort))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> HealthState {
        HealthState::neu(IntGauge::new("test_active_calls", "test").unwrap())
    }

    #[test]
    fn standard_ist_healthy() {
        let state = state();
        assert_eq!(state.status(), HealthStatus::Healthy);
        assert!(state.uptime_seconds() < 5);
    }

    #[test]
    fn fehlende_anbieter_sind_degraded() {
        let state = state();
        state.anbieter_bereit_setzen(false);
        assert_eq!(state.status(), HealthStatus::Degraded);
        assert!(!state.antwort().providers_configured);
    }

    #[test]
    fn herunterfahren_hat_vorrang() {
        let state = state();
        state.anbieter_bereit_setzen(false);
        state.herunterfahren();
        assert_eq!(state.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn antwort_enthaelt_aktive_anrufe() {
        let gauge = IntGauge::new("test_calls", "test").unwrap();
        let state = HealthState::neu(gauge.clone());
        gauge.set(3);
        assert_eq!(state.antwort().active_calls, 3);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            active_calls: 2,
            providers_configured: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"active_calls\":2"));
        assert!(json.contains("\"providers_configured\":true"));
    }

    #[tokio::test]
    async fn endpunkt_meldet_503_beim_herunterfahren() {
        let state = state();
        state.herunterfahren();
        let antwort = health_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

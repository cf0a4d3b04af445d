//! Request-Timing Middleware fuer Axum
//!
//! Misst die Antwortzeit jeder HTTP-Anfrage, protokolliert sie als
//! strukturiertes Log-Event und traegt sie in die HTTP-Metriken ein.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;

use crate::metrics::VoxcallMetrics;

/// Pfade, die als eigenes Label gezaehlt werden; alles andere ist `other`
const BEKANNTE_PFADE: &[&str] = &["/", "/health", "/metrics", "/twilio/call", "/calls", "/ws/call"];

/// Erstellt den Tower-HTTP Trace-Layer fuer Request-Spans.
pub fn request_timing_layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    use tower_http::trace::TraceLayer;
    TraceLayer::new_for_http()
}

/// Axum-Middleware-Funktion: misst Antwortzeit, loggt und zaehlt.
///
/// Verwendung:
/// ```ignore
/// Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(metriken, timing_middleware))
/// ```
pub async fn timing_middleware(
    State(metriken): State<VoxcallMetrics>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let methode = req.method().to_string();
    let pfad = pfad_label(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    let dauer = start.elapsed();
    let status = response.status().as_u16();

    metriken
        .http_requests_total
        .with_label_values(&[&methode, pfad, &status.to_string()])
        .inc();
    metriken
        .http_request_duration_seconds
        .with_label_values(&[&methode, pfad])
        .observe(dauer.as_secs_f64());

    tracing::info!(
        method = %methode,
        path = pfad,
        status = status,
        duration_ms = dauer.as_millis() as u64,
        "HTTP-Anfrage abgeschlossen"
    );

    response
}

/// Begrenzt die Label-Kardinalitaet auf die bekannten Routen
pub fn pfad_label(pfad: &str) -> &'static str {
    BEKANNTE_PFADE
        .iter()
        .find(|&&bekannt| bekannt == pfad)
        .copied()
        .unwrap_or("other")
}

//! Prometheus-kompatible Metriken fuer voxcall
//!
//! Registrierte Metriken:
//! - `voxcall_active_calls` – Gauge: Aktuell laufende Call-Sessions
//! - `voxcall_calls_total` – Counter: Gestartete Call-Sessions
//! - `voxcall_calls_closed_total` – Counter: Beendete Sessions (grund)
//! - `voxcall_call_duration_seconds` – Histogram: Dauer einer Session
//! - `voxcall_frames_received_total` – Counter: Empfangene Audio-Frames
//! - `voxcall_frames_sent_total` – Counter: Gesendete Audio-Frames
//! - `voxcall_frames_dropped_total` – Counter: Verworfene Frames (grund)
//! - `voxcall_frames_lost_total` – Counter: Nie freigegebene Sequenznummern
//! - `voxcall_codec_errors_total` – Counter: Nicht dekodierbare Payloads
//! - `voxcall_barge_ins_total` – Counter: Unterbrechungen des Agenten
//! - `voxcall_turns_total` – Counter: Gespraechsrunden (rolle)
//! - `voxcall_capability_errors_total` – Counter: Fehler von STT/LLM/TTS
//! - `voxcall_first_audio_latency_seconds` – Histogram: Finales Transkript bis Antwortbeginn
//! - `voxcall_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `voxcall_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle voxcall-Prometheus-Metriken
#[derive(Clone)]
pub struct VoxcallMetrics {
    pub registry: Arc<Registry>,

    // Session-Metriken
    pub active_calls: IntGauge,
    pub calls_total: IntCounter,
    pub calls_closed_total: IntCounterVec,
    pub call_duration_seconds: Histogram,

    // Audio-Metriken
    pub frames_received_total: IntCounter,
    pub frames_sent_total: IntCounter,
    pub frames_dropped_total: IntCounterVec,
    pub frames_lost_total: IntCounter,
    pub codec_errors_total: IntCounter,

    // Dialog-Metriken
    pub barge_ins_total: IntCounter,
    pub turns_total: IntCounterVec,
    pub capability_errors_total: IntCounter,
    pub first_audio_latency_seconds: Histogram,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl VoxcallMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Session-Metriken ---
        let active_calls = IntGauge::with_opts(Opts::new(
            "voxcall_active_calls",
            "Anzahl aktuell laufender Call-Sessions",
        ))?;
        registry.register(Box::new(active_calls.clone()))?;

        let calls_total = IntCounter::with_opts(Opts::new(
            "voxcall_calls_total",
            "Gesamtanzahl gestarteter Call-Sessions",
        ))?;
        registry.register(Box::new(calls_total.clone()))?;

        let calls_closed_total = IntCounterVec::new(
            Opts::new("voxcall_calls_closed_total", "Beendete Call-Sessions nach Grund"),
            &["grund"],
        )?;
        registry.register(Box::new(calls_closed_total.clone()))?;

        let call_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("voxcall_call_duration_seconds", "Dauer einer Call-Session")
                .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        )?;
        registry.register(Box::new(call_duration_seconds.clone()))?;

        // --- Audio-Metriken ---
        let frames_received_total = IntCounter::with_opts(Opts::new(
            "voxcall_frames_received_total",
            "Empfangene Audio-Frames",
        ))?;
        registry.register(Box::new(frames_received_total.clone()))?;

        let frames_sent_total = IntCounter::with_opts(Opts::new(
            "voxcall_frames_sent_total",
            "An den Anrufer gesendete Audio-Frames",
        ))?;
        registry.register(Box::new(frames_sent_total.clone()))?;

        let frames_dropped_total = IntCounterVec::new(
            Opts::new("voxcall_frames_dropped_total", "Verworfene Audio-Frames nach Grund"),
            &["grund"],
        )?;
        registry.register(Box::new(frames_dropped_total.clone()))?;

        let frames_lost_total = IntCounter::with_opts(Opts::new(
            "voxcall_frames_lost_total",
            "Sequenznummern, die nie freigegeben wurden",
        ))?;
        registry.register(Box::new(frames_lost_total.clone()))?;

        let codec_errors_total = IntCounter::with_opts(Opts::new(
            "voxcall_codec_errors_total",
            "Nicht dekodierbare Audio-Payloads",
        ))?;
        registry.register(Box::new(codec_errors_total.clone()))?;

        // --- Dialog-Metriken ---
        let barge_ins_total = IntCounter::with_opts(Opts::new(
            "voxcall_barge_ins_total",
            "Unterbrechungen des Agenten durch den Anrufer",
        ))?;
        registry.register(Box::new(barge_ins_total.clone()))?;

        let turns_total = IntCounterVec::new(
            Opts::new("voxcall_turns_total", "Gespraechsrunden nach Rolle"),
            &["rolle"],
        )?;
        registry.register(Box::new(turns_total.clone()))?;

        let capability_errors_total = IntCounter::with_opts(Opts::new(
            "voxcall_capability_errors_total",
            "Fehler von Transkription, Reasoning oder Synthese",
        ))?;
        registry.register(Box::new(capability_errors_total.clone()))?;

        let first_audio_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "voxcall_first_audio_latency_seconds",
                "Zeit vom finalen Transkript bis zum Beginn der Antwort",
            )
            .buckets(vec![0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(first_audio_latency_seconds.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("voxcall_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "voxcall_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            active_calls,
            calls_total,
            calls_closed_total,
            call_duration_seconds,
            frames_received_total,
            frames_sent_total,
            frames_dropped_total,
            frames_lost_total,
            codec_errors_total,
            barge_ins_total,
            turns_total,
            capability_errors_total,
            first_audio_latency_seconds,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: VoxcallMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<VoxcallMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

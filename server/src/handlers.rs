//! HTTP-Handler
//!
//! Fehler werden einheitlich als `{"error": {"code", "message"}}` beantwortet.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use voxcall_protocol::twiml;

use crate::telefonie::TelefonieFehler;
use crate::AppState;

pub(crate) fn fehler_antwort(status: StatusCode, nachricht: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": status.as_u16(),
                "message": nachricht.into(),
            }
        })),
    )
        .into_response()
}

/// GET / – Lebenszeichen
pub async fn status() -> impl IntoResponse {
    Json(json!({ "message": "AI Voice Agent server is running successfully!" }))
}

/// POST /twilio/call – TwiML, das den Anruf auf den Media-Stream lenkt
///
/// Ohne konfigurierte oeffentliche URL wird der `Host`-Header verwendet.
pub async fn anruf_webhook(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let basis = state.config.server.oeffentliche_url.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    });
    let Some(basis) = basis else {
        return fehler_antwort(
            StatusCode::BAD_REQUEST,
            "Weder oeffentliche URL noch Host-Header vorhanden",
        );
    };

    let stream_url = twiml::stream_url_aus_basis(&basis);
    tracing::info!(stream_url = %stream_url, "Eingehender Anruf, verbinde Media-Stream");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        twiml::stream_verbinden(&stream_url),
    )
        .into_response()
}

/// GET /calls – laufende Sessions
pub async fn anrufe_auflisten(State(state): State<AppState>) -> Response {
    let sessions = state.registry.alle();
    (
        StatusCode::OK,
        Json(json!({
            "anzahl": sessions.len(),
            "sessions": sessions,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AnrufAnfrage {
    pub to: String,
}

/// POST /calls – ausgehenden Anruf anlegen
pub async fn anruf_starten(
    State(state): State<AppState>,
    Json(anfrage): Json<AnrufAnfrage>,
) -> Response {
    let Some(twilio) = state.twilio.as_ref() else {
        return fehler_antwort(
            StatusCode::SERVICE_UNAVAILABLE,
            "Ausgehende Anrufe sind nicht konfiguriert",
        );
    };

    match twilio.anrufen(anfrage.to.trim()).await {
        Ok(angelegt) => (
            StatusCode::CREATED,
            Json(json!({
                "sid": angelegt.sid,
                "status": angelegt.status,
                "to": anfrage.to.trim(),
            })),
        )
            .into_response(),
        Err(e @ TelefonieFehler::UngueltigeNummer(_)) => {
            fehler_antwort(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ TelefonieFehler::NichtKonfiguriert(_)) => {
            fehler_antwort(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Ausgehender Anruf fehlgeschlagen");
            fehler_antwort(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

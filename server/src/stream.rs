//! Media-Stream WebSocket (`/ws/call`)
//!
//! Verbindet einen Axum-WebSocket mit einer Call-Session: eingehende
//! Textnachrichten werden zum Eingangsstrom, der Ausgangs-Sink schreibt
//! Textnachrichten zurueck. Binaer-, Ping- und Pong-Frames sind fuer das
//! Protokoll bedeutungslos und werden uebergangen; `Close` beendet den
//! Eingangsstrom.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{future, SinkExt, StreamExt};
use voxcall_dialog::Capabilities;
use voxcall_session::CallSession;

use crate::handlers::fehler_antwort;
use crate::AppState;

/// GET /ws/call – Upgrade auf den Media-Stream
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if *state.shutdown_rx.borrow() {
        return fehler_antwort(StatusCode::SERVICE_UNAVAILABLE, "Server faehrt herunter");
    }
    let Some(faehigkeiten) = state.faehigkeiten.clone() else {
        return fehler_antwort(
            StatusCode::SERVICE_UNAVAILABLE,
            "Sprach-Anbieter nicht konfiguriert",
        );
    };
    let max = state.config.server.max_anrufe;
    if max > 0 && state.registry.anzahl() >= max {
        tracing::warn!(max_anrufe = max, "Anruf abgewiesen, Kapazitaet erreicht");
        return fehler_antwort(StatusCode::SERVICE_UNAVAILABLE, "Zu viele gleichzeitige Anrufe");
    }

    ws.on_upgrade(move |socket| anruf_bedienen(socket, state, faehigkeiten))
}

async fn anruf_bedienen(socket: WebSocket, state: AppState, faehigkeiten: Capabilities) {
    let session = CallSession::neu(
        state.config.session_config(),
        faehigkeiten,
        state.registry.clone(),
        state.metriken.clone(),
    );

    let (sende, empfang) = socket.split();
    let eingang = Box::pin(
        empfang
            .take_while(|nachricht| future::ready(!matches!(nachricht, Ok(Message::Close(_)))))
            .filter_map(|nachricht| {
                future::ready(match nachricht {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
            }),
    );
    let ausgang = Box::pin(
        sende.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text)))),
    );

    let bericht = session
        .verarbeiten(eingang, ausgang, state.shutdown_rx.clone())
        .await;

    tracing::info!(
        call_id = %bericht.call_id,
        grund = %bericht.grund,
        dauer_s = bericht.dauer.as_secs(),
        benutzer_runden = bericht.dialog.benutzer_runden,
        agent_runden = bericht.dialog.agent_runden,
        barge_ins = bericht.dialog.barge_ins,
        frames_verloren = bericht.jitter.verloren,
        "Anruf beendet"
    );
}

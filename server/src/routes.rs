//! Route-Definitionen

use axum::{
    routing::{get, post},
    Router,
};
use voxcall_protocol::twiml::{ANRUF_PFAD, STREAM_PFAD};

use crate::{handlers, stream, AppState};

/// Erstellt den Router fuer Webhook, Media-Stream und Anruf-Verwaltung
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::status))
        // Telefonie
        .route(ANRUF_PFAD, post(handlers::anruf_webhook))
        .route(STREAM_PFAD, get(stream::ws_upgrade))
        // Anrufe
        .route("/calls", get(handlers::anrufe_auflisten))
        .route("/calls", post(handlers::anruf_starten))
}

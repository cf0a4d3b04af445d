//! Fehlertypen fuer das Stream-Protokoll

use thiserror::Error;

/// Fehler beim Parsen oder Erzeugen von Stream-Nachrichten
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Ungueltiges JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ungueltige Base64-Nutzdaten: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Nicht unterstuetztes Audioformat: {encoding} @ {abtastrate} Hz")]
    Audioformat { encoding: String, abtastrate: u32 },
}

pub type ProtokollResult<T> = Result<T, ProtokollFehler>;

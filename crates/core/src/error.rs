//! Fehlertypen fuer voxcall
//!
//! Zentraler Fehler-Enum der die Fehlerklassen der Pipeline abdeckt.
//! Die Komponenten-Crates definieren eigene Fehler (Codec, Transkription,
//! Synthese, Reasoning) und konvertieren via `From` in [`VoxcallError`].

use thiserror::Error;

use crate::event::SchliessGrund;

/// Globaler Result-Alias fuer voxcall
pub type Result<T> = std::result::Result<T, VoxcallError>;

/// Alle Fehlerklassen im voxcall-System
#[derive(Debug, Error)]
pub enum VoxcallError {
    // --- Audio ---
    #[error("Codec-Fehler: {0}")]
    Codec(String),

    // --- Externe Faehigkeiten ---
    #[error("Transkription fehlgeschlagen: {0}")]
    Transkription(String),

    #[error("Sprachsynthese fehlgeschlagen: {0}")]
    Synthese(String),

    #[error("Antwortgenerierung fehlgeschlagen: {0}")]
    Reasoning(String),

    // --- Verbindung & Protokoll ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Session ---
    #[error(transparent)]
    SessionFatal(#[from] SessionFatalError),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl VoxcallError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Fehler, nach denen eine Call-Session vollstaendig abgebaut wird
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFatalError {
    #[error("Stream-Socket getrennt: {0}")]
    SocketGetrennt(String),

    #[error("Zu viele aufeinanderfolgende Faehigkeits-Fehler: {anzahl}")]
    FaehigkeitErschoepft { anzahl: u32 },
}

impl SessionFatalError {
    /// Grund, unter dem die Session abgebaut wird
    pub fn schliess_grund(&self) -> SchliessGrund {
        match self {
            Self::SocketGetrennt(_) => SchliessGrund::SocketGetrennt,
            andere => SchliessGrund::Fatal(andere.to_string()),
        }
    }
}

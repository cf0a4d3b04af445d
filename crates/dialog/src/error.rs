//! Fehlertypen der externen Faehigkeiten (STT, TTS, Reasoning)
//!
//! Alle drei sind pro Runde behebbar: die Dialog-Zustandsmaschine faengt
//! sie ab und antwortet mit einer Rueckfrage oder Entschuldigung. Nur
//! gehaeufte Fehler eskalieren zu einem `SessionFatalError`.

use thiserror::Error;
use voxcall_core::VoxcallError;

/// Fehler beim Transkribieren einer Aeusserung
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    #[error("STT-Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("STT-Anbieter antwortete mit {status}: {nachricht}")]
    Anbieter { status: u16, nachricht: String },

    #[error("Ungueltige STT-Antwort: {0}")]
    UngueltigeAntwort(String),

    #[error("STT-Zeitlimit ueberschritten")]
    Zeitlimit,
}

/// Fehler bei der Sprachsynthese
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("TTS-Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("TTS-Anbieter antwortete mit {status}: {nachricht}")]
    Anbieter { status: u16, nachricht: String },

    #[error("Ungueltige TTS-Antwort: {0}")]
    UngueltigeAntwort(String),

    #[error("TTS-Zeitlimit ueberschritten")]
    Zeitlimit,
}

/// Fehler bei der Antwortgenerierung
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReasoningError {
    #[error("LLM-Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("LLM-Anbieter antwortete mit {status}: {nachricht}")]
    Anbieter { status: u16, nachricht: String },

    #[error("Ungueltige LLM-Antwort: {0}")]
    UngueltigeAntwort(String),

    #[error("LLM-Zeitlimit ueberschritten")]
    Zeitlimit,
}

// ---------------------------------------------------------------------------
// Konvertierungen
// ---------------------------------------------------------------------------

impl From<reqwest::Error> for TranscriptionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Zeitlimit
        } else if e.is_decode() {
            Self::UngueltigeAntwort(e.to_string())
        } else {
            Self::Verbindung(e.to_string())
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Zeitlimit
        } else if e.is_decode() {
            Self::UngueltigeAntwort(e.to_string())
        } else {
            Self::Verbindung(e.to_string())
        }
    }
}

impl From<reqwest::Error> for ReasoningError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Zeitlimit
        } else if e.is_decode() {
            Self::UngueltigeAntwort(e.to_string())
        } else {
            Self::Verbindung(e.to_string())
        }
    }
}

impl From<TranscriptionError> for VoxcallError {
    fn from(e: TranscriptionError) -> Self {
        match e {
            TranscriptionError::Zeitlimit => VoxcallError::Zeitlimit("Transkription".into()),
            andere => VoxcallError::Transkription(andere.to_string()),
        }
    }
}

impl From<SynthesisError> for VoxcallError {
    fn from(e: SynthesisError) -> Self {
        match e {
            SynthesisError::Zeitlimit => VoxcallError::Zeitlimit("Sprachsynthese".into()),
            andere => VoxcallError::Synthese(andere.to_string()),
        }
    }
}

impl From<ReasoningError> for VoxcallError {
    fn from(e: ReasoningError) -> Self {
        match e {
            ReasoningError::Zeitlimit => VoxcallError::Zeitlimit("Antwortgenerierung".into()),
            andere => VoxcallError::Reasoning(andere.to_string()),
        }
    }
}

//! Faehigkeits-Traits fuer externe Dienste
//!
//! Die Pipeline kennt STT, TTS und LLM nur ueber diese drei Traits.
//! Alle liefern einen Stream, damit Teilergebnisse frueh weiterfliessen
//! und ein Abbruch zwischen zwei Elementen wirkt.
//!
//! Konkrete HTTP-Anbieter liegen in [`crate::providers`]; Tests benutzen
//! In-Memory-Implementierungen.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use voxcall_audio::Utterance;

use crate::error::{ReasoningError, SynthesisError, TranscriptionError};
use crate::history::Turn;

/// Ein Ergebnis-Teil des STT-Anbieters
#[derive(Debug, Clone, PartialEq)]
pub struct TranskriptTeil {
    pub text: String,
    pub konfidenz: f32,
    /// `true` fuer das abschliessende Ergebnis der Aeusserung
    pub ist_final: bool,
}

impl TranskriptTeil {
    pub fn partiell(text: impl Into<String>, konfidenz: f32) -> Self {
        Self {
            text: text.into(),
            konfidenz,
            ist_final: false,
        }
    }

    pub fn final_(text: impl Into<String>, konfidenz: f32) -> Self {
        Self {
            text: text.into(),
            konfidenz,
            ist_final: true,
        }
    }
}

/// Stimme und Modell fuer die Sprachsynthese
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    pub stimme_id: String,
    pub modell: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stimme_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            modell: Some("eleven_turbo_v2_5".to_string()),
        }
    }
}

pub type TranskriptTeilStream = BoxStream<'static, Result<TranskriptTeil, TranscriptionError>>;
pub type PcmStream = BoxStream<'static, Result<Vec<i16>, SynthesisError>>;
pub type TextDeltaStream = BoxStream<'static, Result<String, ReasoningError>>;

/// Sprache-zu-Text
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Oeffnet die Transkription einer Aeusserung
    ///
    /// Der Stream liefert beliebig viele partielle Teile und hoechstens
    /// einen finalen.
    async fn transkribieren(
        &self,
        utterance: &Utterance,
    ) -> Result<TranskriptTeilStream, TranscriptionError>;
}

/// Text-zu-Sprache
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthetisiert Text als Folge linearer PCM-Bloecke (8 kHz, mono)
    ///
    /// Die Blockgroesse ist beliebig; der Synthese-Adapter rahmt neu.
    async fn synthetisieren(
        &self,
        text: &str,
        stimme: &VoiceConfig,
    ) -> Result<PcmStream, SynthesisError>;
}

/// Antwortgenerierung
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Erzeugt die naechste Agent-Antwort als Folge von Text-Deltas
    async fn antworten(&self, verlauf: &[Turn]) -> Result<TextDeltaStream, ReasoningError>;
}

/// Buendel der drei Faehigkeiten einer Session
#[derive(Clone)]
pub struct Capabilities {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub reasoner: Arc<dyn Reasoner>,
}

impl Capabilities {
    pub fn neu(
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Self {
        Self { stt, tts, reasoner }
    }
}

//! Ereignisse an die Dialog-Zustandsmaschine
//!
//! Zwei Quellen: die Sprach-Endpunkterkennung (ueber die Session-Schleife)
//! und die kurzlebigen Faehigkeits-Tasks. Ergebnisse der Tasks tragen die
//! ID ihrer Anfrage, damit Ergebnisse ueberholter Anfragen verworfen
//! werden koennen.

use voxcall_audio::{Utterance, VadEreignis};
use voxcall_core::{JobId, UtteranceId};

use crate::error::{ReasoningError, SynthesisError, TranscriptionError};
use crate::transcription::Transcript;

#[derive(Debug)]
pub enum DialogEreignis {
    // --- Endpunkterkennung ---
    SprachBeginn(UtteranceId),
    UtteranceFertig(Utterance),
    BargeIn,

    // --- Transkription ---
    Transkript {
        anfrage: u64,
        transcript: Transcript,
    },
    TranskriptionFehler {
        anfrage: u64,
        fehler: TranscriptionError,
    },

    // --- Reasoning ---
    AntwortDelta {
        runde: u64,
        text: String,
    },
    AntwortFertig {
        runde: u64,
    },
    AntwortFehler {
        runde: u64,
        fehler: ReasoningError,
    },

    // --- Synthese ---
    SyntheseFertig {
        job: JobId,
    },
    SyntheseFehler {
        job: JobId,
        fehler: SynthesisError,
    },
}

impl From<VadEreignis> for DialogEreignis {
    fn from(e: VadEreignis) -> Self {
        match e {
            VadEreignis::SprachBeginn(id) => Self::SprachBeginn(id),
            VadEreignis::UtteranceEnde(u) => Self::UtteranceFertig(u),
            VadEreignis::BargeIn => Self::BargeIn,
        }
    }
}

impl DialogEreignis {
    /// Kurzname fuer Logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SprachBeginn(_) => "sprach_beginn",
            Self::UtteranceFertig(_) => "utterance_fertig",
            Self::BargeIn => "barge_in",
            Self::Transkript { .. } => "transkript",
            Self::TranskriptionFehler { .. } => "transkription_fehler",
            Self::AntwortDelta { .. } => "antwort_delta",
            Self::AntwortFertig { .. } => "antwort_fertig",
            Self::AntwortFehler { .. } => "antwort_fehler",
            Self::SyntheseFertig { .. } => "synthese_fertig",
            Self::SyntheseFehler { .. } => "synthese_fehler",
        }
    }
}

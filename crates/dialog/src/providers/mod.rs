//! HTTP-Anbieter fuer die Faehigkeits-Traits
//!
//! - [`deepgram`] – Transkription (vorab aufgezeichnetes mu-law)
//! - [`elevenlabs`] – Streaming-Sprachsynthese im Telefonie-Format `ulaw_8000`
//! - [`gemini`] – Antwortgenerierung per Server-Sent-Events

pub mod deepgram;
pub mod elevenlabs;
pub mod gemini;

pub use deepgram::{DeepgramConfig, DeepgramStt};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsTts};
pub use gemini::{GeminiConfig, GeminiReasoner};

/// Kuerzt Fehlertexte der Anbieter fuer Logs und Fehlermeldungen
pub(crate) fn fehlertext_kuerzen(text: String) -> String {
    const MAX: usize = 300;
    if text.len() <= MAX {
        return text;
    }
    let mut ende = MAX;
    while !text.is_char_boundary(ende) {
        ende -= 1;
    }
    format!("{}...", &text[..ende])
}

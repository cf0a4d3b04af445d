//! voxcall-dialog – Gespraechsfuehrung einer Call-Session
//!
//! ## Module
//! - [`capability`] – Traits fuer STT, TTS und LLM
//! - [`transcription`] – Transkriptions-Adapter (Aeusserung -> Transkripte)
//! - [`synthesis`] – Synthese-Adapter und abbrechbare Synthese-Jobs
//! - [`machine`] – Dialog-Zustandsmaschine mit Barge-In
//! - [`history`] – begrenzter Gespraechsverlauf
//! - [`providers`] – HTTP-Anbieter (Deepgram, ElevenLabs, Gemini)

pub mod capability;
pub mod chunker;
pub mod ereignis;
pub mod error;
pub mod history;
pub mod machine;
pub mod providers;
pub mod synthesis;
pub mod transcription;

#[cfg(any(test, feature = "testhilfen"))]
pub mod testhilfen;

pub use capability::{
    Capabilities, Reasoner, SpeechToText, TextToSpeech, TranskriptTeil, VoiceConfig,
};
pub use ereignis::DialogEreignis;
pub use error::{ReasoningError, SynthesisError, TranscriptionError};
pub use history::{ConversationHistory, Rolle, Turn};
pub use machine::{DialogConfig, DialogSession, DialogStatistik, DialogZustand};
pub use synthesis::{JobZustand, SynthesisAdapter, SynthesisJob};
pub use transcription::{Transcript, TranscriptStream, TranscriptionAdapter, TranskriptArt};

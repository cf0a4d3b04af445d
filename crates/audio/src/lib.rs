//! voxcall-audio – Audio-Grundlagen der Sprach-Pipeline
//!
//! - [`frame`] – unveraenderliche 20-ms-PCM-Frames (8 kHz, i16)
//! - [`codec`] – mu-law Kodierung/Dekodierung des Telefonie-Formats
//! - [`utterance`] – zusammenhaengende Aeusserung aus mehreren Frames
//! - [`dsp::vad`] – Energie-basierte Sprach-Endpunkterkennung mit Barge-In

pub mod codec;
pub mod dsp;
pub mod error;
pub mod frame;
pub mod utterance;

// Bequeme Re-Exporte der wichtigsten Typen
pub use dsp::vad::{Vad, VadConfig, VadEreignis, VadZustand};
pub use error::{CodecError, CodecResult};
pub use frame::{AudioFrame, ABTASTRATE_HZ, FRAME_BYTES, FRAME_DAUER, SAMPLES_PRO_FRAME};
pub use utterance::Utterance;

//! Fehlertypen fuer den Audio-Codec

use thiserror::Error;
use voxcall_core::VoxcallError;

/// Fehler beim Dekodieren eines Wire-Frames
///
/// Ein `CodecError` betrifft immer nur einen einzelnen Frame: der Aufrufer
/// verwirft ihn und macht mit dem naechsten weiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Leerer Frame")]
    Leer,

    #[error("Frame abgeschnitten: {laenge} von {erwartet} Samples")]
    Abgeschnitten { laenge: usize, erwartet: usize },

    #[error("Frame zu gross: {laenge} statt {erwartet} Samples")]
    ZuGross { laenge: usize, erwartet: usize },
}

pub type CodecResult<T> = Result<T, CodecError>;

impl From<CodecError> for VoxcallError {
    fn from(e: CodecError) -> Self {
        VoxcallError::Codec(e.to_string())
    }
}

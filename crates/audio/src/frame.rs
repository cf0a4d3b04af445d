//! Audio-Frame – 20 ms lineares PCM
//!
//! Jeder Frame traegt genau [`SAMPLES_PRO_FRAME`] Samples (8 kHz, mono, i16),
//! eine pro Richtung streng steigende Sequenznummer und den Ankunftszeitpunkt.
//! Frames sind nach der Erzeugung unveraenderlich; die Samples liegen in einem
//! `Arc<[i16]>`, Klonen kopiert also keine Audiodaten.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{CodecError, CodecResult};

/// Abtastrate des Telefonie-Audios
pub const ABTASTRATE_HZ: u32 = 8000;

/// Dauer eines Frames
pub const FRAME_DAUER: Duration = Duration::from_millis(20);

/// Samples pro Frame (20 ms bei 8 kHz)
pub const SAMPLES_PRO_FRAME: usize = 160;

/// Wire-Bytes pro Frame (ein mu-law-Byte pro Sample)
pub const FRAME_BYTES: usize = SAMPLES_PRO_FRAME;

/// Unveraenderlicher PCM-Frame
#[derive(Debug, Clone)]
pub struct AudioFrame {
    sequence: u64,
    samples: Arc<[i16]>,
    ankunft: Instant,
}

impl AudioFrame {
    /// Erstellt einen Frame; schlaegt fehl wenn nicht genau 160 Samples vorliegen
    pub fn neu(sequence: u64, samples: Arc<[i16]>, ankunft: Instant) -> CodecResult<Self> {
        match samples.len() {
            0 => Err(CodecError::Leer),
            n if n < SAMPLES_PRO_FRAME => Err(CodecError::Abgeschnitten {
                laenge: n,
                erwartet: SAMPLES_PRO_FRAME,
            }),
            n if n > SAMPLES_PRO_FRAME => Err(CodecError::ZuGross {
                laenge: n,
                erwartet: SAMPLES_PRO_FRAME,
            }),
            _ => Ok(Self {
                sequence,
                samples,
                ankunft,
            }),
        }
    }

    /// Erstellt einen Frame aus bis zu 160 Samples, der Rest wird mit Stille aufgefuellt
    ///
    /// Ueberzaehlige Samples werden abgeschnitten.
    pub fn aufgefuellt(sequence: u64, samples: &[i16], ankunft: Instant) -> Self {
        let mut puffer = [0i16; SAMPLES_PRO_FRAME];
        let n = samples.len().min(SAMPLES_PRO_FRAME);
        puffer[..n].copy_from_slice(&samples[..n]);
        Self {
            sequence,
            samples: Arc::from(&puffer[..]),
            ankunft,
        }
    }

    /// Erstellt einen stillen Frame
    pub fn stille(sequence: u64, ankunft: Instant) -> Self {
        Self::aufgefuellt(sequence, &[], ankunft)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn ankunft(&self) -> Instant {
        self.ankunft
    }

    /// Normalisierte RMS-Energie (0.0..1.0)
    pub fn energie(&self) -> f32 {
        crate::dsp::rms_energie(&self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_braucht_160_samples() {
        let jetzt = Instant::now();
        assert!(AudioFrame::neu(1, Arc::from(vec![0i16; 160]), jetzt).is_ok());
        assert_eq!(
            AudioFrame::neu(1, Arc::from(vec![0i16; 80]), jetzt).unwrap_err(),
            CodecError::Abgeschnitten {
                laenge: 80,
                erwartet: 160
            }
        );
        assert_eq!(
            AudioFrame::neu(1, Arc::from(Vec::<i16>::new()), jetzt).unwrap_err(),
            CodecError::Leer
        );
    }

    #[test]
    fn aufgefuellter_frame_hat_stille_am_ende() {
        let frame = AudioFrame::aufgefuellt(5, &[1000; 100], Instant::now());
        assert_eq!(frame.samples().len(), SAMPLES_PRO_FRAME);
        assert_eq!(frame.samples()[99], 1000);
        assert_eq!(frame.samples()[100], 0);
        assert_eq!(frame.sequence(), 5);
    }

    #[test]
    fn klonen_teilt_samples() {
        let frame = AudioFrame::aufgefuellt(1, &[7; 160], Instant::now());
        let kopie = frame.clone();
        assert!(std::ptr::eq(frame.samples().as_ptr(), kopie.samples().as_ptr()));
    }
}

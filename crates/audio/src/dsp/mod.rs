//! DSP-Module fuer die Sprach-Pipeline

pub mod vad;

/// Berechnet den normalisierten RMS-Energiewert eines Frames (0.0..1.0)
pub fn rms_energie(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let summe: f64 = samples
        .iter()
        .map(|&s| {
            let x = s as f64 / 32768.0;
            x * x
        })
        .sum();
    (summe / samples.len() as f64).sqrt() as f32
}

//! G.711 mu-law Codec fuer 8-kHz-Telefonie-Audio
//!
//! Dekodierung ueber eine zur Compilezeit berechnete Tabelle mit 256
//! Eintraegen, Kodierung arithmetisch ohne Verzweigung auf den Datenpfad.
//! Ausser dem Sample-Puffer des Frames wird pro Aufruf nichts alloziert.
//!
//! Der Wert 0x7F ("negative Null") wird als -1 dekodiert, damit
//! `encode(decode(b)) == b` fuer jedes Byte bitgenau gilt.

use std::sync::Arc;
use tokio::time::Instant;

use crate::error::{CodecError, CodecResult};
use crate::frame::{AudioFrame, FRAME_BYTES};

/// Bias der mu-law-Kennlinie
const BIAS: i32 = 0x84;

/// Maximaler Betrag vor dem Kodieren
const CLIP: i32 = 32635;

const fn mulaw_dekodieren_roh(byte: u8) -> i16 {
    let u = !byte;
    let exponent = (u >> 4) & 0x07;
    let mantisse = (u & 0x0F) as i16;
    let betrag = (((mantisse << 3) + BIAS as i16) << exponent) - BIAS as i16;
    if u & 0x80 != 0 {
        if betrag == 0 {
            -1
        } else {
            -betrag
        }
    } else {
        betrag
    }
}

const DEKODIER_TABELLE: [i16; 256] = {
    let mut tabelle = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        tabelle[i] = mulaw_dekodieren_roh(i as u8);
        i += 1;
    }
    tabelle
};

/// Dekodiert ein mu-law-Byte in ein lineares 16-Bit-Sample
#[inline]
pub fn mulaw_zu_linear(byte: u8) -> i16 {
    DEKODIER_TABELLE[byte as usize]
}

/// Kodiert ein lineares 16-Bit-Sample als mu-law-Byte
#[inline]
pub fn linear_zu_mulaw(sample: i16) -> u8 {
    let mut wert = sample as i32;
    let vorzeichen = if wert < 0 {
        wert = -wert;
        0x80
    } else {
        0x00
    };
    wert = wert.min(CLIP) + BIAS;

    // Position des hoechsten gesetzten Bits oberhalb von Bit 7
    let exponent = (31 - (wert as u32 | 0x80).leading_zeros() as i32 - 7).clamp(0, 7);
    let mantisse = (wert >> (exponent + 3)) & 0x0F;
    !((vorzeichen | (exponent << 4) | mantisse) as u8)
}

/// Dekodiert einen Wire-Frame (160 mu-law-Bytes) in einen [`AudioFrame`]
pub fn decode(wire: &[u8], sequence: u64, ankunft: Instant) -> CodecResult<AudioFrame> {
    if wire.is_empty() {
        return Err(CodecError::Leer);
    }
    if wire.len() < FRAME_BYTES {
        return Err(CodecError::Abgeschnitten {
            laenge: wire.len(),
            erwartet: FRAME_BYTES,
        });
    }
    if wire.len() > FRAME_BYTES {
        return Err(CodecError::ZuGross {
            laenge: wire.len(),
            erwartet: FRAME_BYTES,
        });
    }
    let samples: Arc<[i16]> = wire.iter().map(|&b| mulaw_zu_linear(b)).collect();
    AudioFrame::neu(sequence, samples, ankunft)
}

/// Kodiert einen Frame in 160 mu-law-Bytes
pub fn encode(frame: &AudioFrame) -> [u8; FRAME_BYTES] {
    let mut wire = [0u8; FRAME_BYTES];
    for (ziel, &sample) in wire.iter_mut().zip(frame.samples()) {
        *ziel = linear_zu_mulaw(sample);
    }
    wire
}

/// Dekodiert einen beliebig langen mu-law-Puffer
pub fn mulaw_zu_pcm(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&b| mulaw_zu_linear(b)).collect()
}

/// Kodiert einen beliebig langen PCM-Puffer als mu-law
pub fn pcm_zu_mulaw(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().map(|&s| linear_zu_mulaw(s)).collect()
}

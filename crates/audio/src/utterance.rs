//! Utterance – eine zusammenhaengende Aeusserung des Anrufers
//!
//! Wird von der VAD zwischen Start- und Endpunkt gesammelt und an den
//! Transkriptions-Adapter uebergeben. Nach der Transkription (oder nach
//! einem Abbruch) wird sie verworfen.

use std::time::Duration;
use voxcall_core::UtteranceId;

use crate::codec;
use crate::frame::{AudioFrame, FRAME_DAUER};

/// Geordnete Folge von Frames einer Aeusserung
#[derive(Debug, Clone)]
pub struct Utterance {
    id: UtteranceId,
    frames: Vec<AudioFrame>,
}

impl Utterance {
    pub fn neu(id: UtteranceId, frames: Vec<AudioFrame>) -> Self {
        Self { id, frames }
    }

    pub fn id(&self) -> UtteranceId {
        self.id
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn ist_leer(&self) -> bool {
        self.frames.is_empty()
    }

    /// Audiodauer der Aeusserung
    pub fn dauer(&self) -> Duration {
        FRAME_DAUER * self.frames.len() as u32
    }

    /// Alle Samples hintereinander
    pub fn samples(&self) -> Vec<i16> {
        self.frames
            .iter()
            .flat_map(|f| f.samples().iter().copied())
            .collect()
    }

    /// Die Aeusserung als mu-law-Bytes (Eingabeformat der STT-Anbieter)
    pub fn mulaw(&self) -> Vec<u8> {
        let mut aus = Vec::with_capacity(self.frames.len() * crate::frame::FRAME_BYTES);
        for frame in &self.frames {
            aus.extend_from_slice(&codec::encode(frame));
        }
        aus
    }

    /// Haengt eine spaetere Aeusserung an; die ID der aelteren bleibt erhalten
    pub fn anhaengen(&mut self, spaeter: Utterance) {
        self.frames.extend(spaeter.frames);
    }
}

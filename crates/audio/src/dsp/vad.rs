//! Voice Activity Detection und Endpunkterkennung
//!
//! Energie-basierter Zustandsautomat `Stille -> Sprechend -> Stille`:
//! - **Onset**: `onset_frames` aufeinanderfolgende Frames ueber der
//!   Energieschwelle bestaetigen den Sprachbeginn. Die Onset-Frames gehoeren
//!   bereits zur Aeusserung.
//! - **Hangover**: erst `hangover_frames` aufeinanderfolgende leise Frames
//!   beenden die Aeusserung. Kuerzere Pausen (zwischen Woertern) schneiden
//!   nichts ab.
//! - **Barge-In**: spricht der Agent gerade, meldet ein bestaetigter Onset
//!   sofort [`VadEreignis::BargeIn`]. In diesem Modus darf der Onset von
//!   kurzen Einbruechen bis `barge_in_max_stille_frames` unterbrochen werden.

use voxcall_core::UtteranceId;

use crate::frame::{AudioFrame, FRAME_DAUER};
use crate::utterance::Utterance;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer die VAD
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Energie-Schwellenwert (normalisierte RMS, 0.0..1.0)
    pub energie_schwelle: f32,
    /// Laute Frames in Folge bis zum Sprachbeginn
    pub onset_frames: u32,
    /// Leise Frames in Folge bis zum Ende der Aeusserung
    pub hangover_frames: u32,
    /// Tolerierte Stille-Frames im Onset, solange der Agent spricht
    pub barge_in_max_stille_frames: u32,
    /// Obergrenze fuer die Laenge einer Aeusserung in Frames
    pub max_utterance_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energie_schwelle: 0.02,
            onset_frames: 3,
            hangover_frames: 25,
            barge_in_max_stille_frames: 5,
            // 30 Sekunden
            max_utterance_frames: (30_000 / FRAME_DAUER.as_millis()) as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// Zustand und Ereignisse
// ---------------------------------------------------------------------------

/// Zustand der Endpunkterkennung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadZustand {
    Stille,
    Sprechend,
}

/// Ereignisse der VAD
#[derive(Debug, Clone)]
pub enum VadEreignis {
    /// Sprachbeginn bestaetigt
    SprachBeginn(UtteranceId),
    /// Aeusserung abgeschlossen
    UtteranceEnde(Utterance),
    /// Anrufer spricht in laufende Agenten-Ausgabe hinein
    BargeIn,
}

// ---------------------------------------------------------------------------
// Vad
// ---------------------------------------------------------------------------

/// Voice Activity Detector mit Endpunkterkennung
pub struct Vad {
    config: VadConfig,
    zustand: VadZustand,
    /// Laute Frames im laufenden Onset
    onset_zaehler: u32,
    /// Leise Frames im laufenden Onset (nur bei aktivem Agenten toleriert)
    onset_luecke: u32,
    /// Frames des laufenden Onsets
    vorlauf: Vec<AudioFrame>,
    /// Leise Frames in Folge waehrend `Sprechend`
    stille_zaehler: u32,
    aktuelle_id: UtteranceId,
    frames: Vec<AudioFrame>,
    naechste_id: u64,
    agent_aktiv: bool,
    barge_in_gemeldet: bool,
}

impl Vad {
    pub fn neu(config: VadConfig) -> Self {
        Self {
            config,
            zustand: VadZustand::Stille,
            onset_zaehler: 0,
            onset_luecke: 0,
            vorlauf: Vec::new(),
            stille_zaehler: 0,
            aktuelle_id: UtteranceId(0),
            frames: Vec::new(),
            naechste_id: 1,
            agent_aktiv: false,
            barge_in_gemeldet: false,
        }
    }

    /// Erstellt eine VAD mit Standardkonfiguration
    pub fn standard() -> Self {
        Self::neu(VadConfig::default())
    }

    pub fn zustand(&self) -> VadZustand {
        self.zustand
    }

    /// Teilt der VAD mit, ob der Agent gerade denkt oder spricht
    pub fn agent_aktiv_setzen(&mut self, aktiv: bool) {
        self.agent_aktiv = aktiv;
    }

    pub fn agent_aktiv(&self) -> bool {
        self.agent_aktiv
    }

    /// Verarbeitet den naechsten Frame (in Sequenzreihenfolge)
    pub fn verarbeiten(&mut self, frame: AudioFrame) -> Vec<VadEreignis> {
        let laut = frame.energie() > self.config.energie_schwelle;
        let mut ereignisse = Vec::new();

        match self.zustand {
            VadZustand::Stille => {
                if laut {
                    self.onset_zaehler += 1;
                    self.onset_luecke = 0;
                    self.vorlauf.push(frame);
                    if self.onset_zaehler >= self.config.onset_frames {
                        self.sprache_beginnen(&mut ereignisse);
                    }
                } else if self.onset_zaehler > 0 {
                    if self.agent_aktiv && self.onset_luecke < self.config.barge_in_max_stille_frames
                    {
                        self.onset_luecke += 1;
                        self.vorlauf.push(frame);
                    } else {
                        self.onset_verwerfen();
                    }
                }
            }
            VadZustand::Sprechend => {
                self.frames.push(frame);
                if laut {
                    self.stille_zaehler = 0;
                    if self.agent_aktiv && !self.barge_in_gemeldet {
                        self.barge_in_gemeldet = true;
                        tracing::info!(utterance = %self.aktuelle_id, "Barge-In waehrend Aeusserung");
                        ereignisse.push(VadEreignis::BargeIn);
                    }
                } else {
                    self.stille_zaehler += 1;
                }

                if self.stille_zaehler >= self.config.hangover_frames {
                    // Hangover-Stille gehoert nicht mehr zur Aeusserung
                    let behalten = self.frames.len() - self.stille_zaehler as usize;
                    self.frames.truncate(behalten);
                    ereignisse.push(self.aeusserung_beenden());
                } else if self.frames.len() >= self.config.max_utterance_frames {
                    tracing::debug!(
                        utterance = %self.aktuelle_id,
                        frames = self.frames.len(),
                        "Maximale Aeusserungslaenge erreicht"
                    );
                    ereignisse.push(self.aeusserung_beenden());
                }
            }
        }

        ereignisse
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn sprache_beginnen(&mut self, ereignisse: &mut Vec<VadEreignis>) {
        self.aktuelle_id = UtteranceId(self.naechste_id);
        self.naechste_id += 1;
        self.zustand = VadZustand::Sprechend;
        self.frames = std::mem::take(&mut self.vorlauf);
        self.onset_zaehler = 0;
        self.onset_luecke = 0;
        self.stille_zaehler = 0;
        self.barge_in_gemeldet = false;

        tracing::debug!(utterance = %self.aktuelle_id, "Sprachbeginn erkannt");
        ereignisse.push(VadEreignis::SprachBeginn(self.aktuelle_id));

        if self.agent_aktiv {
            self.barge_in_gemeldet = true;
            tracing::info!(utterance = %self.aktuelle_id, "Barge-In erkannt");
            ereignisse.push(VadEreignis::BargeIn);
        }
    }

    fn aeusserung_beenden(&mut self) -> VadEreignis {
        let frames = std::mem::take(&mut self.frames);
        let utterance = Utterance::neu(self.aktuelle_id, frames);
        tracing::debug!(
            utterance = %utterance.id(),
            dauer_ms = utterance.dauer().as_millis() as u64,
            "Aeusserung beendet"
        );
        self.zustand = VadZustand::Stille;
        self.stille_zaehler = 0;
        self.barge_in_gemeldet = false;
        VadEreignis::UtteranceEnde(utterance)
    }

    fn onset_verwerfen(&mut self) {
        self.onset_zaehler = 0;
        self.onset_luecke = 0;
        self.vorlauf.clear();
    }
}

//! Transkriptions-Adapter
//!
//! Macht aus einer Aeusserung einen geordneten, lazy Strom von
//! Transkripten: beliebig viele partielle, danach genau ein finales.
//! Der Anbieter wird erst beim ersten `naechstes()` kontaktiert.
//!
//! Endet der Anbieter-Stream ohne finales Ergebnis, wird das letzte
//! partielle zum finalen befoerdert (oder ein leeres finales erzeugt).
//! Nach Abbruch liefert der Strom sofort `None`; Teilergebnisse werden
//! verworfen.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use voxcall_audio::Utterance;
use voxcall_core::UtteranceId;

use crate::capability::{SpeechToText, TranskriptTeil, TranskriptTeilStream};
use crate::error::TranscriptionError;

/// Art eines Transkripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranskriptArt {
    Partiell,
    Final,
}

/// Transkript einer Aeusserung
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub utterance_id: UtteranceId,
    pub text: String,
    pub konfidenz: f32,
    pub art: TranskriptArt,
}

impl Transcript {
    pub fn ist_final(&self) -> bool {
        self.art == TranskriptArt::Final
    }
}

/// Adapter zwischen Endpunkterkennung und STT-Anbieter
#[derive(Clone)]
pub struct TranscriptionAdapter {
    stt: Arc<dyn SpeechToText>,
}

impl TranscriptionAdapter {
    pub fn neu(stt: Arc<dyn SpeechToText>) -> Self {
        Self { stt }
    }

    /// Erzeugt den (noch nicht gestarteten) Transkript-Strom einer Aeusserung
    pub fn stream_utterance(
        &self,
        utterance: Arc<Utterance>,
        abbruch: CancellationToken,
    ) -> TranscriptStream {
        TranscriptStream {
            stt: Arc::clone(&self.stt),
            utterance,
            abbruch,
            zustand: StromZustand::Bereit,
            letzter_partiell: None,
        }
    }
}

enum StromZustand {
    Bereit,
    Laufend(TranskriptTeilStream),
    Beendet,
}

/// Lazy Strom von Transkripten einer Aeusserung
pub struct TranscriptStream {
    stt: Arc<dyn SpeechToText>,
    utterance: Arc<Utterance>,
    abbruch: CancellationToken,
    zustand: StromZustand,
    letzter_partiell: Option<Transcript>,
}

impl TranscriptStream {
    pub fn utterance_id(&self) -> UtteranceId {
        self.utterance.id()
    }

    /// Bricht den Strom ab (idempotent, auch vor dem Start)
    pub fn abbrechen(&mut self) {
        self.abbruch.cancel();
        self.zustand = StromZustand::Beendet;
        self.letzter_partiell = None;
    }

    /// Naechstes Transkript; `None` nach dem finalen, nach Fehler oder Abbruch
    pub async fn naechstes(&mut self) -> Option<Result<Transcript, TranscriptionError>> {
        loop {
            if self.abbruch.is_cancelled() {
                self.abbrechen();
                return None;
            }

            match &mut self.zustand {
                StromZustand::Beendet => return None,

                StromZustand::Bereit => {
                    let geoeffnet = tokio::select! {
                        biased;
                        _ = self.abbruch.cancelled() => None,
                        r = self.stt.transkribieren(&self.utterance) => Some(r),
                    };
                    match geoeffnet {
                        None => {
                            self.abbrechen();
                            return None;
                        }
                        Some(Ok(strom)) => self.zustand = StromZustand::Laufend(strom),
                        Some(Err(e)) => {
                            self.zustand = StromZustand::Beendet;
                            return Some(Err(e));
                        }
                    }
                }

                StromZustand::Laufend(strom) => {
                    let teil = tokio::select! {
                        biased;
                        _ = self.abbruch.cancelled() => None,
                        t = strom.next() => Some(t),
                    };
                    match teil {
                        None => {
                            self.abbrechen();
                            return None;
                        }
                        Some(t) => return Some(self.teil_verarbeiten(t)),
                    }
                }
            }
        }
    }

    fn teil_verarbeiten(
        &mut self,
        teil: Option<Result<TranskriptTeil, TranscriptionError>>,
    ) -> Result<Transcript, TranscriptionError> {
        let id = self.utterance.id();
        match teil {
            Some(Ok(teil)) if teil.ist_final => {
                self.zustand = StromZustand::Beendet;
                self.letzter_partiell = None;
                Ok(Transcript {
                    utterance_id: id,
                    text: teil.text,
                    konfidenz: teil.konfidenz,
                    art: TranskriptArt::Final,
                })
            }
            Some(Ok(teil)) => {
                let t = Transcript {
                    utterance_id: id,
                    text: teil.text,
                    konfidenz: teil.konfidenz,
                    art: TranskriptArt::Partiell,
                };
                self.letzter_partiell = Some(t.clone());
                Ok(t)
            }
            Some(Err(e)) => {
                self.zustand = StromZustand::Beendet;
                self.letzter_partiell = None;
                Err(e)
            }
            None => {
                self.zustand = StromZustand::Beendet;
                let befoerdert = match self.letzter_partiell.take() {
                    Some(p) => Transcript {
                        art: TranskriptArt::Final,
                        ..p
                    },
                    None => Transcript {
                        utterance_id: id,
                        text: String::new(),
                        konfidenz: 0.0,
                        art: TranskriptArt::Final,
                    },
                };
                tracing::debug!(
                    utterance = %id,
                    "STT-Stream ohne finales Ergebnis beendet – letztes Teilergebnis befoerdert"
                );
                Ok(befoerdert)
            }
        }
    }
}

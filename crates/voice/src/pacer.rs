//! Taktgeber fuer die Ausgangsrichtung
//!
//! Gibt alle 20 ms genau einen Frame aus dem [`PlayoutBuffer`] frei,
//! unabhaengig davon wie schnell die Synthese produziert. Ein ausstehendes
//! Clear (nach Barge-In) wird vor dem naechsten Frame gemeldet, faellige
//! Markierungen direkt nach dem Frame, hinter dem sie stehen.
//!
//! Die Ausgaben gehen ueber eine begrenzte mpsc-Queue an den Sende-Task
//! der Session. Ist die Queue voll, wird verworfen statt zu warten: der
//! Takt darf nie vom Socket abhaengen.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use voxcall_audio::{AudioFrame, FRAME_DAUER};
use voxcall_core::JobId;

use crate::playout::PlayoutBuffer;

/// Ausgabe des Taktgebers an den Sende-Task
#[derive(Debug, Clone)]
pub enum PacerAusgabe {
    /// Beim Anbieter gepuffertes Audio verwerfen
    Leeren,
    /// Frame an den Anrufer senden
    Frame(AudioFrame),
    /// Alle Frames eines Jobs sind abgegeben
    Markierung(JobId),
}

/// Taktgeber einer Session
pub struct Pacer {
    puffer: PlayoutBuffer,
    takt: Duration,
}

impl Pacer {
    pub fn neu(puffer: PlayoutBuffer) -> Self {
        Self {
            puffer,
            takt: FRAME_DAUER,
        }
    }

    /// Startet den Taktgeber als eigenen Task
    ///
    /// Der Task endet, wenn `abbruch` ausgeloest oder die Queue geschlossen wird.
    pub fn starten(
        self,
        ausgabe: mpsc::Sender<PacerAusgabe>,
        abbruch: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.laufen(ausgabe, abbruch).await })
    }

    async fn laufen(self, ausgabe: mpsc::Sender<PacerAusgabe>, abbruch: CancellationToken) {
        let mut intervall = tokio::time::interval(self.takt);
        intervall.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                _ = intervall.tick() => {}
            }

            if self.puffer.clear_abholen() && !Self::senden(&ausgabe, PacerAusgabe::Leeren) {
                break;
            }
            if let Some(frame) = self.puffer.naechster() {
                if !Self::senden(&ausgabe, PacerAusgabe::Frame(frame)) {
                    break;
                }
            }
            if let Some(job) = self.puffer.marke_abholen() {
                if !Self::senden(&ausgabe, PacerAusgabe::Markierung(job)) {
                    break;
                }
            }
        }
        tracing::debug!("Taktgeber beendet");
    }

    /// Nicht-blockierend senden; `false` wenn der Empfaenger weg ist
    fn senden(ausgabe: &mpsc::Sender<PacerAusgabe>, nachricht: PacerAusgabe) -> bool {
        match ausgabe.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Sende-Queue voll – Ausgabe verworfen");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Sende-Queue geschlossen");
                false
            }
        }
    }
}

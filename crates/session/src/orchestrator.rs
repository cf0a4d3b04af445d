//! Call-Session – Verarbeitet einen einzelnen Media-Stream
//!
//! Jeder WebSocket des Telefonie-Anbieters bekommt eine `CallSession` in
//! einem eigenen tokio-Task.
//!
//! ## Lebenszyklus
//! ```text
//! Connecting --start--> Active --stop/close/idle/fatal/shutdown--> Closing -> Closed
//! ```
//!
//! ## Tasks
//! - Session-Schleife: liest den Stream, treibt Jitter-Buffer, VAD und
//!   Dialog, wartet auf Fristen und Faehigkeits-Ergebnisse
//! - Taktgeber: gibt alle 20 ms einen Frame aus dem Playout-Buffer frei
//! - Sende-Task: serialisiert Frames und Clears auf den Socket
//!
//! Der Abbau passiert genau einmal, am einzigen Ausgang der Schleife.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use voxcall_audio::{codec, AudioFrame, Vad, VadConfig};
use voxcall_core::{CallId, SchliessGrund, SessionFatalError};
use voxcall_dialog::{
    Capabilities, DialogConfig, DialogEreignis, DialogSession, DialogStatistik, DialogZustand,
    Turn, VoiceConfig,
};
use voxcall_observability::VoxcallMetrics;
use voxcall_protocol::stream::sequenz_aus_media;
use voxcall_protocol::{AusgehendeNachricht, EingehendeNachricht, MediaDaten, StartDaten};
use voxcall_voice::{
    InboundJitterBuffer, JitterBufferConfig, JitterBufferStatistik, Pacer, PacerAusgabe,
    PlayoutBuffer, PlayoutConfig, PlayoutStatistik,
};

use crate::registry::{SessionInfo, SessionRegistry, SessionZustand};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration aller Komponenten einer Session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jitter: JitterBufferConfig,
    pub vad: VadConfig,
    pub playout: PlayoutConfig,
    pub dialog: DialogConfig,
    pub stimme: VoiceConfig,
    /// Maximale Wartezeit auf die `start`-Nachricht
    pub start_timeout: Duration,
    /// Kapazitaet der Queue zwischen Taktgeber und Sende-Task
    pub sende_kapazitaet: usize,
    /// Maximale Wartezeit auf den Sende-Task beim Abbau
    pub abbau_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jitter: JitterBufferConfig::default(),
            vad: VadConfig::default(),
            playout: PlayoutConfig::default(),
            dialog: DialogConfig::default(),
            stimme: VoiceConfig::default(),
            start_timeout: Duration::from_secs(10),
            sende_kapazitaet: 32,
            abbau_timeout: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Bericht
// ---------------------------------------------------------------------------

/// Zusammenfassung einer beendeten Session
#[derive(Debug, Clone)]
pub struct SessionBericht {
    pub call_id: CallId,
    pub stream_sid: Option<String>,
    pub grund: SchliessGrund,
    pub dauer: Duration,
    /// Nicht dekodierbare Media-Nachrichten
    pub codec_fehler: u64,
    pub jitter: JitterBufferStatistik,
    pub playout: PlayoutStatistik,
    pub dialog: DialogStatistik,
    pub verlauf: Vec<Turn>,
    /// Wie oft der Dialog Ressourcen freigegeben hat
    pub freigaben: u32,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Komponenten einer aktiven Session (existieren erst ab `start`)
struct Pipeline {
    stream_sid: String,
    jitter: InboundJitterBuffer,
    vad: Vad,
    dialog: DialogSession,
    dialog_rx: mpsc::Receiver<DialogEreignis>,
    playout: PlayoutBuffer,
    abbruch: CancellationToken,
    pacer: JoinHandle<()>,
    sender: JoinHandle<Result<(), String>>,
    codec_fehler: u64,
    gemeldet: DialogStatistik,
    dialog_zustand: DialogZustand,
}

/// Ergebnis eines Durchlaufs der Session-Schleife
enum Schritt {
    Shutdown,
    Nachricht(Option<Result<String, String>>),
    Dialog(Option<DialogEreignis>),
    Frist,
    SenderBeendet(Result<Result<(), String>, JoinError>),
}

// ---------------------------------------------------------------------------
// CallSession
// ---------------------------------------------------------------------------

/// Verarbeitet einen Media-Stream von `connected` bis zum Abbau
pub struct CallSession {
    call_id: CallId,
    config: SessionConfig,
    faehigkeiten: Capabilities,
    registry: SessionRegistry,
    metriken: VoxcallMetrics,
}

impl CallSession {
    pub fn neu(
        config: SessionConfig,
        faehigkeiten: Capabilities,
        registry: SessionRegistry,
        metriken: VoxcallMetrics,
    ) -> Self {
        Self {
            call_id: CallId::new(),
            config,
            faehigkeiten,
            registry,
            metriken,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Startet die Session-Schleife
    ///
    /// `eingang` liefert die Textnachrichten des Sockets, `ausgang` nimmt
    /// die Antworten auf. Die Methode kehrt erst nach dem Abbau zurueck.
    pub async fn verarbeiten<S, E, K>(
        self,
        eingang: S,
        ausgang: K,
        shutdown_rx: watch::Receiver<bool>,
    ) -> SessionBericht
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
        K: Sink<String> + Unpin + Send + 'static,
        K::Error: fmt::Display,
    {
        let span = tracing::info_span!("call", call_id = %self.call_id);
        self.ausfuehren(eingang, ausgang, shutdown_rx)
            .instrument(span)
            .await
    }

    async fn ausfuehren<S, E, K>(
        self,
        mut eingang: S,
        ausgang: K,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SessionBericht
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
        K: Sink<String> + Unpin + Send + 'static,
        K::Error: fmt::Display,
    {
        let beginn = Instant::now();
        tracing::info!("Neuer Media-Stream");
        self.registry.registrieren(SessionInfo::neu(self.call_id));
        self.metriken.calls_total.inc();
        self.metriken.active_calls.inc();

        let (grund, pipeline) = match self.auf_start_warten(&mut eingang, &mut shutdown_rx).await {
            Ok((stream_sid, start)) => {
                let mut pipeline = self.pipeline_aufbauen(stream_sid, &start, ausgang);
                let grund = self
                    .schleife(&mut pipeline, &mut eingang, &mut shutdown_rx)
                    .await;
                (grund, Some(pipeline))
            }
            Err(grund) => (grund, None),
        };

        self.abbauen(grund, pipeline, beginn).await
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau
    // -----------------------------------------------------------------------

    /// Liest Nachrichten bis `start`; alles davor ausser `stop` wird ignoriert
    async fn auf_start_warten<S, E>(
        &self,
        eingang: &mut S,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(String, StartDaten), SchliessGrund>
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        if *shutdown_rx.borrow() {
            return Err(SchliessGrund::Shutdown);
        }
        let frist = tokio::time::sleep(self.config.start_timeout);
        tokio::pin!(frist);

        loop {
            let nachricht = tokio::select! {
                _ = &mut frist => {
                    tracing::warn!(
                        timeout_s = self.config.start_timeout.as_secs(),
                        "Keine start-Nachricht erhalten"
                    );
                    return Err(SchliessGrund::Fatal("start-Nachricht fehlt".into()));
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Err(SchliessGrund::Shutdown);
                    }
                    continue;
                }
                nachricht = eingang.next() => nachricht,
            };

            let text = match nachricht {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    tracing::warn!(fehler = %e, "Lesefehler vor start");
                    return Err(SchliessGrund::SocketGetrennt);
                }
                None => {
                    tracing::info!("Stream vor start geschlossen");
                    return Err(SchliessGrund::StreamGeschlossen);
                }
            };

            match EingehendeNachricht::parsen(&text) {
                Ok(EingehendeNachricht::Start { stream_sid, start }) => {
                    if let Err(e) = start.format_pruefen() {
                        tracing::error!(fehler = %e, "Audioformat nicht unterstuetzt");
                        return Err(SchliessGrund::Fatal(e.to_string()));
                    }
                    return Ok((stream_sid, start));
                }
                Ok(EingehendeNachricht::Connected { protocol, .. }) => {
                    tracing::debug!(protocol = ?protocol, "Stream verbunden");
                }
                Ok(EingehendeNachricht::Stop { .. }) => {
                    return Err(SchliessGrund::StreamGestoppt);
                }
                Ok(andere) => {
                    tracing::trace!(nachricht = ?andere, "Nachricht vor start ignoriert");
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, "Ungueltige Nachricht verworfen");
                }
            }
        }
    }

    /// Erstellt alle Komponenten und startet Taktgeber und Sende-Task
    fn pipeline_aufbauen<K>(&self, stream_sid: String, start: &StartDaten, ausgang: K) -> Pipeline
    where
        K: Sink<String> + Unpin + Send + 'static,
        K::Error: fmt::Display,
    {
        tracing::info!(
            stream_sid = %stream_sid,
            call_sid = ?start.call_sid,
            "Media-Stream gestartet"
        );
        let call_sid = start.call_sid.clone();
        let sid = stream_sid.clone();
        self.registry.aktualisieren(&self.call_id, |info| {
            info.zustand = SessionZustand::Active;
            info.stream_sid = Some(sid);
            info.call_sid = call_sid;
        });

        let playout = PlayoutBuffer::neu(self.config.playout.clone());
        let (mut dialog, dialog_rx) = DialogSession::neu(
            self.config.dialog.clone(),
            self.faehigkeiten.clone(),
            self.config.stimme.clone(),
            playout.clone(),
        );

        let abbruch = CancellationToken::new();
        let (sende_tx, sende_rx) = mpsc::channel(self.config.sende_kapazitaet.max(1));
        let pacer = Pacer::neu(playout.clone()).starten(sende_tx, abbruch.clone());
        let sender = tokio::spawn(
            senden(ausgang, stream_sid.clone(), sende_rx, self.metriken.clone())
                .in_current_span(),
        );

        dialog.starten();
        let mut vad = Vad::neu(self.config.vad.clone());
        vad.agent_aktiv_setzen(dialog.agent_aktiv());
        let dialog_zustand = dialog.zustand();
        self.registry.dialog_setzen(&self.call_id, dialog_zustand);

        Pipeline {
            stream_sid,
            jitter: InboundJitterBuffer::neu(self.config.jitter.clone()),
            vad,
            dialog,
            dialog_rx,
            playout,
            abbruch,
            pacer,
            sender,
            codec_fehler: 0,
            gemeldet: DialogStatistik::default(),
            dialog_zustand,
        }
    }

    // -----------------------------------------------------------------------
    // Session-Schleife
    // -----------------------------------------------------------------------

    async fn schleife<S, E>(
        &self,
        p: &mut Pipeline,
        eingang: &mut S,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SchliessGrund
    where
        S: Stream<Item = Result<String, E>> + Unpin,
        E: fmt::Display,
    {
        loop {
            let frist = fruehere(p.dialog.naechste_frist(), p.jitter.naechste_frist());

            let schritt = tokio::select! {
                Ok(()) = shutdown_rx.changed() => Schritt::Shutdown,
                nachricht = eingang.next() => {
                    Schritt::Nachricht(nachricht.map(|n| n.map_err(|e| e.to_string())))
                }
                ereignis = p.dialog_rx.recv() => Schritt::Dialog(ereignis),
                _ = frist_abwarten(frist) => Schritt::Frist,
                ergebnis = &mut p.sender => Schritt::SenderBeendet(ergebnis),
            };

            let ergebnis = match schritt {
                Schritt::Shutdown => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Shutdown-Signal empfangen");
                        return SchliessGrund::Shutdown;
                    }
                    Ok(())
                }
                Schritt::Nachricht(Some(Ok(text))) => match self.nachricht_verarbeiten(p, &text) {
                    Ok(Some(grund)) => return grund,
                    Ok(None) => Ok(()),
                    Err(fatal) => Err(fatal),
                },
                Schritt::Nachricht(Some(Err(e))) => {
                    tracing::warn!(fehler = %e, "Lesefehler auf dem Socket");
                    Err(SessionFatalError::SocketGetrennt(e))
                }
                Schritt::Nachricht(None) => {
                    tracing::info!("Stream ohne stop geschlossen");
                    return SchliessGrund::StreamGeschlossen;
                }
                Schritt::Dialog(Some(ereignis)) => p.dialog.verarbeiten(ereignis),
                Schritt::Dialog(None) => Ok(()),
                Schritt::Frist => {
                    let jetzt = Instant::now();
                    let frames = p.jitter.freigeben(jetzt);
                    self.frames_weiterleiten(p, frames)
                        .and_then(|()| p.dialog.frist_pruefen(jetzt))
                }
                Schritt::SenderBeendet(ergebnis) => {
                    let ursache = match ergebnis {
                        Ok(Err(e)) => e,
                        Err(e) => e.to_string(),
                        Ok(Ok(())) => "Sende-Task unerwartet beendet".to_string(),
                    };
                    Err(SessionFatalError::SocketGetrennt(ursache))
                }
            };

            if let Err(fatal) = ergebnis {
                tracing::error!(fehler = %fatal, "Session-fataler Fehler");
                return fatal.schliess_grund();
            }

            if p.dialog.zustand() == DialogZustand::Closing {
                return p
                    .dialog
                    .schliess_grund()
                    .cloned()
                    .unwrap_or(SchliessGrund::Leerlauf);
            }
            self.nachziehen(p);
        }
    }

    /// Verarbeitet eine Textnachricht; `Some` beendet die Session
    fn nachricht_verarbeiten(
        &self,
        p: &mut Pipeline,
        text: &str,
    ) -> Result<Option<SchliessGrund>, SessionFatalError> {
        let nachricht = match EingehendeNachricht::parsen(text) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(fehler = %e, "Ungueltige Nachricht verworfen");
                return Ok(None);
            }
        };

        match nachricht {
            EingehendeNachricht::Media {
                sequence_number,
                media,
            } => {
                self.media_verarbeiten(p, sequence_number.as_deref(), &media)?;
            }
            EingehendeNachricht::Stop { .. } => {
                tracing::info!("stop empfangen");
                return Ok(Some(SchliessGrund::StreamGestoppt));
            }
            EingehendeNachricht::Mark { mark, .. } => {
                tracing::debug!(name = %mark.name, "Markierung abgespielt");
            }
            EingehendeNachricht::Start { stream_sid, .. } => {
                tracing::warn!(stream_sid = %stream_sid, "Wiederholtes start ignoriert");
            }
            EingehendeNachricht::Connected { .. } | EingehendeNachricht::Unbekannt => {}
        }
        Ok(None)
    }

    /// Codec -> Jitter-Buffer -> VAD; Fehler im Frame verwerfen nur den Frame
    fn media_verarbeiten(
        &self,
        p: &mut Pipeline,
        sequence_number: Option<&str>,
        media: &MediaDaten,
    ) -> Result<(), SessionFatalError> {
        let ankunft = Instant::now();
        let Some(sequenz) = sequenz_aus_media(sequence_number, media) else {
            tracing::debug!("Media ohne Sequenznummer verworfen");
            self.metriken
                .frames_dropped_total
                .with_label_values(&["ohne_sequenz"])
                .inc();
            return Ok(());
        };

        let frame = media
            .payload_dekodieren()
            .map_err(|e| e.to_string())
            .and_then(|bytes| codec::decode(&bytes, sequenz, ankunft).map_err(|e| e.to_string()));
        let frame = match frame {
            Ok(frame) => frame,
            Err(fehler) => {
                p.codec_fehler += 1;
                self.metriken.codec_errors_total.inc();
                tracing::debug!(sequence = sequenz, fehler = %fehler, "Frame nicht dekodierbar");
                return Ok(());
            }
        };

        self.metriken.frames_received_total.inc();
        p.jitter.push(frame);
        let frames = p.jitter.freigeben(ankunft);
        self.frames_weiterleiten(p, frames)
    }

    /// Fuehrt freigegebene Frames durch die VAD in den Dialog
    fn frames_weiterleiten(
        &self,
        p: &mut Pipeline,
        frames: Vec<AudioFrame>,
    ) -> Result<(), SessionFatalError> {
        for frame in frames {
            for ereignis in p.vad.verarbeiten(frame) {
                p.dialog.verarbeiten(DialogEreignis::from(ereignis))?;
                p.vad.agent_aktiv_setzen(p.dialog.agent_aktiv());
            }
        }
        Ok(())
    }

    /// Gleicht VAD, Registry und Metriken mit dem Dialog ab
    fn nachziehen(&self, p: &mut Pipeline) {
        p.vad.agent_aktiv_setzen(p.dialog.agent_aktiv());

        let zustand = p.dialog.zustand();
        if zustand != p.dialog_zustand {
            tracing::debug!(von = %p.dialog_zustand, nach = %zustand, "Dialog-Zustand");
            p.dialog_zustand = zustand;
            self.registry.dialog_setzen(&self.call_id, zustand);
        }

        if let Some(latenz) = p.dialog.antwort_latenz_abholen() {
            tracing::debug!(latenz_ms = latenz.as_millis() as u64, "Antwort-Latenz");
            self.metriken
                .first_audio_latency_seconds
                .observe(latenz.as_secs_f64());
        }

        let aktuell = p.dialog.statistik();
        let alt = &p.gemeldet;
        self.metriken
            .barge_ins_total
            .inc_by(aktuell.barge_ins.saturating_sub(alt.barge_ins));
        self.metriken
            .turns_total
            .with_label_values(&["benutzer"])
            .inc_by(aktuell.benutzer_runden.saturating_sub(alt.benutzer_runden));
        self.metriken
            .turns_total
            .with_label_values(&["agent"])
            .inc_by(aktuell.agent_runden.saturating_sub(alt.agent_runden));
        self.metriken
            .capability_errors_total
            .inc_by(aktuell.faehigkeits_fehler.saturating_sub(alt.faehigkeits_fehler));
        p.gemeldet = aktuell;
    }

    // -----------------------------------------------------------------------
    // Abbau
    // -----------------------------------------------------------------------

    /// Einziger Ausgang einer Session: gibt alles frei und meldet sich ab
    async fn abbauen(
        &self,
        grund: SchliessGrund,
        pipeline: Option<Pipeline>,
        beginn: Instant,
    ) -> SessionBericht {
        tracing::info!(grund = %grund, "Session wird abgebaut");
        self.registry
            .zustand_setzen(&self.call_id, SessionZustand::Closing);

        let mut bericht = SessionBericht {
            call_id: self.call_id,
            stream_sid: None,
            grund: grund.clone(),
            dauer: Duration::ZERO,
            codec_fehler: 0,
            jitter: JitterBufferStatistik::default(),
            playout: PlayoutStatistik::default(),
            dialog: DialogStatistik::default(),
            verlauf: Vec::new(),
            freigaben: 0,
        };

        if let Some(mut p) = pipeline {
            p.dialog.schliessen(grund.clone());
            self.nachziehen(&mut p);

            // Taktgeber stoppen; der Sende-Task leert seine Queue und schliesst den Socket
            p.abbruch.cancel();
            if let Err(e) = p.pacer.await {
                tracing::warn!(fehler = %e, "Taktgeber-Task fehlgeschlagen");
            }
            if !p.sender.is_finished() {
                match tokio::time::timeout(self.config.abbau_timeout, &mut p.sender).await {
                    Ok(Ok(Err(e))) => tracing::debug!(fehler = %e, "Senden beim Abbau fehlgeschlagen"),
                    Ok(_) => {}
                    Err(_) => {
                        tracing::warn!("Sende-Task haengt – wird abgebrochen");
                        p.sender.abort();
                    }
                }
            }

            let jitter = p.jitter.statistik().clone();
            self.metriken.frames_lost_total.inc_by(jitter.verloren);
            for (label, anzahl) in [
                ("verspaetet", jitter.verspaetet),
                ("duplikat", jitter.duplikate),
                ("ueberlauf", jitter.ueberlauf),
            ] {
                self.metriken
                    .frames_dropped_total
                    .with_label_values(&[label])
                    .inc_by(anzahl);
            }

            bericht.stream_sid = Some(p.stream_sid);
            bericht.codec_fehler = p.codec_fehler;
            bericht.jitter = jitter;
            bericht.playout = p.playout.statistik();
            bericht.dialog = p.dialog.statistik();
            bericht.verlauf = p.dialog.verlauf().snapshot();
            bericht.freigaben = p.dialog.freigaben();
        }

        bericht.dauer = beginn.elapsed();
        self.registry
            .zustand_setzen(&self.call_id, SessionZustand::Closed);
        self.registry.entfernen(&self.call_id);
        self.metriken.active_calls.dec();
        self.metriken
            .calls_closed_total
            .with_label_values(&[grund_label(&grund)])
            .inc();
        self.metriken
            .call_duration_seconds
            .observe(bericht.dauer.as_secs_f64());

        tracing::info!(
            dauer_s = bericht.dauer.as_secs(),
            benutzer_runden = bericht.dialog.benutzer_runden,
            agent_runden = bericht.dialog.agent_runden,
            barge_ins = bericht.dialog.barge_ins,
            frames_verloren = bericht.jitter.verloren,
            codec_fehler = bericht.codec_fehler,
            "Session beendet"
        );
        bericht
    }
}

// ---------------------------------------------------------------------------
// Sende-Task
// ---------------------------------------------------------------------------

/// Schreibt die Ausgaben des Taktgebers als JSON auf den Socket
async fn senden<K>(
    mut ausgang: K,
    stream_sid: String,
    mut rx: mpsc::Receiver<PacerAusgabe>,
    metriken: VoxcallMetrics,
) -> Result<(), String>
where
    K: Sink<String> + Unpin,
    K::Error: fmt::Display,
{
    while let Some(ausgabe) = rx.recv().await {
        let (nachricht, ist_frame) = match ausgabe {
            PacerAusgabe::Leeren => (AusgehendeNachricht::clear(&stream_sid), false),
            PacerAusgabe::Frame(frame) => (
                AusgehendeNachricht::media(&stream_sid, &codec::encode(&frame)),
                true,
            ),
            PacerAusgabe::Markierung(job) => {
                (AusgehendeNachricht::mark(&stream_sid, job.to_string()), false)
            }
        };
        let text = nachricht.serialisieren().map_err(|e| e.to_string())?;
        ausgang.send(text.clone()).await.map_err(|e| e.to_string())?;
        if ist_frame {
            metriken.frames_sent_total.inc();
        } else {
            tracing::debug!(nachricht = %text, "Steuernachricht gesendet");
        }
    }
    if let Err(e) = ausgang.close().await {
        tracing::debug!(fehler = %e, "Socket beim Schliessen bereits getrennt");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

fn fruehere(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

async fn frist_abwarten(frist: Option<Instant>) {
    match frist {
        Some(zeitpunkt) => tokio::time::sleep_until(zeitpunkt).await,
        None => std::future::pending().await,
    }
}

/// Metrik-Label ohne Freitext
fn grund_label(grund: &SchliessGrund) -> &'static str {
    match grund {
        SchliessGrund::StreamGestoppt => "stream_gestoppt",
        SchliessGrund::StreamGeschlossen => "stream_geschlossen",
        SchliessGrund::SocketGetrennt => "socket_getrennt",
        SchliessGrund::Leerlauf => "leerlauf",
        SchliessGrund::Fatal(_) => "fatal",
        SchliessGrund::Shutdown => "shutdown",
    }
}

//! Dialog-Zustandsmaschine einer Session
//!
//! ```text
//! Idle -> Listening -> Thinking -> Speaking -> Listening ... -> Closing
//! ```
//!
//! Die Maschine laeuft synchron in der Session-Schleife: `verarbeiten`
//! und `frist_pruefen` blockieren nie. Alles Langsame (STT, LLM, TTS)
//! laeuft in kurzlebigen Tasks, deren Ergebnisse als [`DialogEreignis`]
//! zurueckkommen. Jedes Ergebnis traegt die ID seiner Anfrage; Ergebnisse
//! ueberholter Anfragen werden verworfen.
//!
//! Vorrang: Barge-In schlaegt laufende Denk- und Sprecharbeit. Finale
//! Transkripte zaehlen nur in `Listening`. Aeusserungen, die ausserhalb von
//! `Listening` enden, werden gehalten (zusammengefuehrt) und bei Rueckkehr
//! nach `Listening` transkribiert.

use futures_util::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use voxcall_audio::Utterance;
use voxcall_core::{JobId, SchliessGrund, SessionFatalError};
use voxcall_voice::PlayoutBuffer;

use crate::capability::{Capabilities, Reasoner, VoiceConfig};
use crate::chunker::SatzChunker;
use crate::ereignis::DialogEreignis;
use crate::error::{ReasoningError, SynthesisError, TranscriptionError};
use crate::history::{ConversationHistory, Rolle, Turn};
use crate::synthesis::{SynthesisAdapter, SynthesisJob};
use crate::transcription::{Transcript, TranscriptionAdapter};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der Dialog-Zustandsmaschine
#[derive(Debug, Clone)]
pub struct DialogConfig {
    /// Maximale Wartezeit auf Modell, Transkription oder Audio-Fortschritt
    pub denkzeit_limit: Duration,
    /// Stille in `Listening`, nach der die Session beendet wird
    pub leerlauf_timeout: Duration,
    /// Eroeffnungssatz beim Start (None = direkt zuhoeren)
    pub begruessung: Option<String>,
    /// Rueckfrage nach gescheiterter Transkription
    pub rueckfrage: String,
    /// Entschuldigung nach gescheiterter Antwort oder Synthese
    pub entschuldigung: String,
    /// Aufeinanderfolgende Faehigkeits-Fehler bis zum Abbruch der Session
    pub max_fehler_in_folge: u32,
    /// Obergrenze des Gespraechsverlaufs
    pub max_turns: usize,
    /// Kapazitaet der Ereignis-Queue der Faehigkeits-Tasks
    pub ereignis_kapazitaet: usize,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            denkzeit_limit: Duration::from_secs(15),
            leerlauf_timeout: Duration::from_secs(120),
            begruessung: Some(
                "Hello! I'm a helpful AI assistant. How can I assist you today?".to_string(),
            ),
            rueckfrage: "Sorry, could you repeat that?".to_string(),
            entschuldigung: "I'm sorry, I'm having trouble answering right now. Could you say that again?"
                .to_string(),
            max_fehler_in_folge: 3,
            max_turns: 50,
            ereignis_kapazitaet: 64,
        }
    }
}

/// Abstand der Fortschrittspruefung in `Speaking`
const FORTSCHRITT_INTERVALL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Zustand & Statistik
// ---------------------------------------------------------------------------

/// Zustand des Dialogs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogZustand {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Closing,
}

impl fmt::Display for DialogZustand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Zaehler einer Dialog-Session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogStatistik {
    pub benutzer_runden: u64,
    pub agent_runden: u64,
    pub barge_ins: u64,
    pub transkriptionen: u64,
    pub faehigkeits_fehler: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobArt {
    Begruessung,
    Antwort,
    Rueckfall,
}

struct LaufendeTranskription {
    anfrage: u64,
    utterance: Arc<Utterance>,
    abbruch: CancellationToken,
    versuch: u32,
    frist: Instant,
}

struct LaufendesReasoning {
    runde: u64,
    abbruch: CancellationToken,
    chunker: SatzChunker,
}

struct LaufenderJob {
    job: SynthesisJob,
    art: JobArt,
}

/// Letzter beobachteter Fortschritt der Sprachausgabe
struct Sprechfortschritt {
    zuletzt: Instant,
    gesendet: Option<u64>,
    pruefung: Instant,
}

// ---------------------------------------------------------------------------
// DialogSession
// ---------------------------------------------------------------------------

/// Dialog-Zustand einer Call-Session
pub struct DialogSession {
    config: DialogConfig,
    transkription_adapter: TranscriptionAdapter,
    synthese: SynthesisAdapter,
    reasoner: Arc<dyn Reasoner>,
    playout: PlayoutBuffer,
    ereignis_tx: mpsc::Sender<DialogEreignis>,

    zustand: DialogZustand,
    schliess_grund: Option<SchliessGrund>,
    verlauf: ConversationHistory,

    transkription: Option<LaufendeTranskription>,
    gehalten: Option<Utterance>,
    letzter_partiell: Option<String>,
    anrufer_spricht: bool,

    reasoning: Option<LaufendesReasoning>,
    denk_frist: Option<Instant>,

    job: Option<LaufenderJob>,
    sprechfortschritt: Option<Sprechfortschritt>,
    leerlauf_seit: Instant,

    naechste_anfrage: u64,
    naechste_runde: u64,
    naechster_job: u64,
    fehler_in_folge: u32,
    freigaben: u32,
    final_zeitpunkt: Option<Instant>,
    antwort_latenz: Option<Duration>,
    statistik: DialogStatistik,
}

impl DialogSession {
    /// Erstellt die Maschine im Zustand `Idle`
    ///
    /// Der Empfaenger liefert die Ergebnisse der Faehigkeits-Tasks und muss
    /// von der Session-Schleife zurueck in [`DialogSession::verarbeiten`]
    /// gefuehrt werden.
    pub fn neu(
        config: DialogConfig,
        faehigkeiten: Capabilities,
        stimme: VoiceConfig,
        playout: PlayoutBuffer,
    ) -> (Self, mpsc::Receiver<DialogEreignis>) {
        let (ereignis_tx, ereignis_rx) = mpsc::channel(config.ereignis_kapazitaet.max(1));
        let verlauf = ConversationHistory::neu(config.max_turns);
        let session = Self {
            transkription_adapter: TranscriptionAdapter::neu(faehigkeiten.stt),
            synthese: SynthesisAdapter::neu(faehigkeiten.tts, stimme),
            reasoner: faehigkeiten.reasoner,
            playout,
            ereignis_tx,
            zustand: DialogZustand::Idle,
            schliess_grund: None,
            verlauf,
            transkription: None,
            gehalten: None,
            letzter_partiell: None,
            anrufer_spricht: false,
            reasoning: None,
            denk_frist: None,
            job: None,
            sprechfortschritt: None,
            leerlauf_seit: Instant::now(),
            naechste_anfrage: 0,
            naechste_runde: 0,
            naechster_job: 0,
            fehler_in_folge: 0,
            freigaben: 0,
            final_zeitpunkt: None,
            antwort_latenz: None,
            statistik: DialogStatistik::default(),
            config,
        };
        (session, ereignis_rx)
    }

    /// Verlaesst `Idle`: spricht die Begruessung oder hoert direkt zu
    pub fn starten(&mut self) {
        if self.zustand != DialogZustand::Idle {
            return;
        }
        match self.config.begruessung.clone() {
            Some(text) if !text.trim().is_empty() => {
                tracing::debug!("Begruessung wird gesprochen");
                self.sprechen(&text, JobArt::Begruessung);
            }
            _ => self.zuhoeren(),
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn zustand(&self) -> DialogZustand {
        self.zustand
    }

    /// `true` solange der Agent denkt oder spricht (steuert Barge-In der VAD)
    pub fn agent_aktiv(&self) -> bool {
        matches!(self.zustand, DialogZustand::Thinking | DialogZustand::Speaking)
    }

    pub fn verlauf(&self) -> &ConversationHistory {
        &self.verlauf
    }

    pub fn schliess_grund(&self) -> Option<&SchliessGrund> {
        self.schliess_grund.as_ref()
    }

    /// Wie oft Ressourcen freigegeben wurden (0 oder 1)
    pub fn freigaben(&self) -> u32 {
        self.freigaben
    }

    pub fn statistik(&self) -> DialogStatistik {
        self.statistik.clone()
    }

    pub fn letzter_partiell(&self) -> Option<&str> {
        self.letzter_partiell.as_deref()
    }

    /// Aktueller Synthese-Job
    pub fn aktiver_job(&self) -> Option<SynthesisJob> {
        self.job.as_ref().map(|l| l.job.clone())
    }

    /// Zeit vom finalen Transkript bis zum Start der Antwort-Synthese (einmalig)
    pub fn antwort_latenz_abholen(&mut self) -> Option<Duration> {
        self.antwort_latenz.take()
    }

    /// Naechster Zeitpunkt, zu dem [`DialogSession::frist_pruefen`] etwas tun wird
    pub fn naechste_frist(&self) -> Option<Instant> {
        match self.zustand {
            DialogZustand::Thinking => self.denk_frist,
            DialogZustand::Listening => match &self.transkription {
                Some(laufend) => Some(laufend.frist),
                None => self.leerlauf_frist(),
            },
            DialogZustand::Speaking => self.sprechfortschritt.as_ref().map(|f| f.pruefung),
            _ => None,
        }
    }

    fn leerlauf_frist(&self) -> Option<Instant> {
        let wartet = self.zustand == DialogZustand::Listening
            && !self.anrufer_spricht
            && self.transkription.is_none()
            && self.gehalten.is_none();
        wartet.then(|| self.leerlauf_seit + self.config.leerlauf_timeout)
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    /// Verarbeitet ein Ereignis; nur gehaeufte Faehigkeits-Fehler sind fatal
    pub fn verarbeiten(&mut self, ereignis: DialogEreignis) -> Result<(), SessionFatalError> {
        if self.zustand == DialogZustand::Closing {
            tracing::trace!(ereignis = ereignis.name(), "Dialog geschlossen, Ereignis ignoriert");
            return Ok(());
        }
        tracing::trace!(ereignis = ereignis.name(), zustand = %self.zustand, "Dialog-Ereignis");

        match ereignis {
            DialogEreignis::SprachBeginn(id) => {
                self.anrufer_spricht = true;
                tracing::debug!(utterance = %id, zustand = %self.zustand, "Anrufer spricht");
            }
            DialogEreignis::UtteranceFertig(utterance) => self.utterance_fertig(utterance),
            DialogEreignis::BargeIn => self.barge_in(),
            DialogEreignis::Transkript {
                anfrage,
                transcript,
            } => self.transkript(anfrage, transcript),
            DialogEreignis::TranskriptionFehler { anfrage, fehler } => {
                return self.transkription_fehlgeschlagen(anfrage, fehler);
            }
            DialogEreignis::AntwortDelta { runde, text } => self.antwort_delta(runde, &text),
            DialogEreignis::AntwortFertig { runde } => return self.antwort_fertig(runde),
            DialogEreignis::AntwortFehler { runde, fehler } => {
                return self.antwort_fehlgeschlagen(runde, fehler);
            }
            DialogEreignis::SyntheseFertig { job } => self.synthese_fertig(job),
            DialogEreignis::SyntheseFehler { job, fehler } => {
                return self.synthese_fehlgeschlagen(job, fehler);
            }
        }
        Ok(())
    }

    /// Prueft Denkzeit, Transkription, Sprachfortschritt und Leerlauf gegen `jetzt`
    pub fn frist_pruefen(&mut self, jetzt: Instant) -> Result<(), SessionFatalError> {
        match self.zustand {
            DialogZustand::Thinking => {
                if self.denk_frist.is_some_and(|frist| jetzt >= frist) {
                    tracing::warn!(
                        limit_ms = self.config.denkzeit_limit.as_millis() as u64,
                        "Denkzeit ueberschritten – Entschuldigung"
                    );
                    self.reasoning_abbrechen();
                    self.fehler_zaehlen()?;
                    let text = self.config.entschuldigung.clone();
                    self.sprechen(&text, JobArt::Rueckfall);
                }
            }
            DialogZustand::Listening => {
                if let Some(laufend) = &self.transkription {
                    if jetzt >= laufend.frist {
                        let anfrage = laufend.anfrage;
                        laufend.abbruch.cancel();
                        return self
                            .transkription_fehlgeschlagen(anfrage, TranscriptionError::Zeitlimit);
                    }
                } else if self.leerlauf_frist().is_some_and(|frist| jetzt >= frist) {
                    tracing::info!(
                        timeout_s = self.config.leerlauf_timeout.as_secs(),
                        "Leerlauf – Dialog wird beendet"
                    );
                    self.schliessen(SchliessGrund::Leerlauf);
                }
            }
            DialogZustand::Speaking => {
                let limit = self.config.denkzeit_limit;
                let gesendet = self.playout.zuletzt_gesendet();
                let Some(f) = self.sprechfortschritt.as_mut() else {
                    return Ok(());
                };
                if jetzt < f.pruefung {
                    return Ok(());
                }
                if gesendet != f.gesendet {
                    f.zuletzt = jetzt;
                    f.gesendet = gesendet;
                }
                if jetzt.duration_since(f.zuletzt) >= limit {
                    return self.ausgabe_stockt();
                }
                f.pruefung = (jetzt + FORTSCHRITT_INTERVALL).min(f.zuletzt + limit);
            }
            _ => {}
        }
        Ok(())
    }

    /// Beendet den Dialog und gibt alle Ressourcen frei (idempotent)
    ///
    /// Gibt `true` beim ersten wirksamen Aufruf zurueck.
    pub fn schliessen(&mut self, grund: SchliessGrund) -> bool {
        if self.zustand == DialogZustand::Closing {
            return false;
        }
        tracing::info!(grund = %grund, zustand = %self.zustand, "Dialog wird geschlossen");

        if let Some(laufend) = self.job.take() {
            laufend.job.abbrechen();
        }
        self.reasoning_abbrechen();
        if let Some(laufend) = self.transkription.take() {
            laufend.abbruch.cancel();
        }
        self.gehalten = None;
        self.sprechfortschritt = None;
        self.playout.leeren();

        self.zustand = DialogZustand::Closing;
        self.schliess_grund = Some(grund);
        self.freigaben += 1;
        true
    }

    // -----------------------------------------------------------------------
    // Endpunkterkennung
    // -----------------------------------------------------------------------

    fn utterance_fertig(&mut self, utterance: Utterance) {
        self.anrufer_spricht = false;
        self.leerlauf_seit = Instant::now();
        if utterance.ist_leer() {
            return;
        }

        let utterance = match self.gehalten.take() {
            Some(mut gehalten) => {
                gehalten.anhaengen(utterance);
                gehalten
            }
            None => utterance,
        };

        if self.zustand == DialogZustand::Listening && self.transkription.is_none() {
            self.transkription_starten(Arc::new(utterance), 0);
        } else {
            tracing::debug!(
                utterance = %utterance.id(),
                zustand = %self.zustand,
                dauer_ms = utterance.dauer().as_millis() as u64,
                "Aeusserung gehalten"
            );
            self.gehalten = Some(utterance);
        }
    }

    fn barge_in(&mut self) {
        match self.zustand {
            DialogZustand::Speaking => {
                let zuletzt_gesendet = self.playout.zuletzt_gesendet();
                if let Some(laufend) = self.job.take() {
                    laufend.job.abbrechen();
                    let gesprochen = laufend.job.gesprochener_text(zuletzt_gesendet);
                    self.agent_runde(gesprochen);
                }
                let verworfen = self.playout.leeren();
                self.reasoning_abbrechen();
                self.statistik.barge_ins += 1;
                tracing::info!(verworfen, "Barge-In: Ausgabe abgebrochen");
                self.zuhoeren();
            }
            DialogZustand::Thinking => {
                self.reasoning_abbrechen();
                self.statistik.barge_ins += 1;
                tracing::info!("Barge-In: Antwortgenerierung abgebrochen");
                self.zuhoeren();
            }
            _ => tracing::trace!(zustand = %self.zustand, "Barge-In ohne Wirkung"),
        }
    }

    // -----------------------------------------------------------------------
    // Transkription
    // -----------------------------------------------------------------------

    fn transkription_starten(&mut self, utterance: Arc<Utterance>, versuch: u32) {
        self.naechste_anfrage += 1;
        let anfrage = self.naechste_anfrage;
        let abbruch = CancellationToken::new();
        let mut strom = self
            .transkription_adapter
            .stream_utterance(Arc::clone(&utterance), abbruch.clone());
        let tx = self.ereignis_tx.clone();

        tracing::debug!(
            utterance = %utterance.id(),
            anfrage,
            versuch,
            dauer_ms = utterance.dauer().as_millis() as u64,
            "Transkription gestartet"
        );

        tokio::spawn(async move {
            while let Some(ergebnis) = strom.naechstes().await {
                let ereignis = match ergebnis {
                    Ok(transcript) => DialogEreignis::Transkript {
                        anfrage,
                        transcript,
                    },
                    Err(fehler) => DialogEreignis::TranskriptionFehler { anfrage, fehler },
                };
                if tx.send(ereignis).await.is_err() {
                    break;
                }
            }
        });

        self.transkription = Some(LaufendeTranskription {
            anfrage,
            utterance,
            abbruch,
            versuch,
            frist: Instant::now() + self.config.denkzeit_limit,
        });
    }

    fn transkript(&mut self, anfrage: u64, transcript: Transcript) {
        match &self.transkription {
            Some(laufend) if laufend.anfrage == anfrage => {}
            _ => {
                tracing::debug!(anfrage, "Veraltetes Transkript verworfen");
                return;
            }
        }

        if !transcript.ist_final() {
            tracing::trace!(text = %transcript.text, "Teil-Transkript");
            self.letzter_partiell = Some(transcript.text);
            return;
        }

        self.transkription = None;
        self.letzter_partiell = None;
        self.statistik.transkriptionen += 1;

        if self.zustand != DialogZustand::Listening {
            tracing::debug!(zustand = %self.zustand, "Finales Transkript ausserhalb von Listening verworfen");
            return;
        }

        let text = transcript.text.trim();
        if text.is_empty() {
            tracing::debug!(utterance = %transcript.utterance_id, "Leeres Transkript ignoriert");
            self.zuhoeren();
            return;
        }

        tracing::info!(
            utterance = %transcript.utterance_id,
            konfidenz = transcript.konfidenz,
            zeichen = text.len(),
            "Benutzer-Runde erkannt"
        );
        self.verlauf.anhaengen(Rolle::Benutzer, text);
        self.statistik.benutzer_runden += 1;
        self.final_zeitpunkt = Some(Instant::now());
        self.denken();
    }

    fn transkription_fehlgeschlagen(
        &mut self,
        anfrage: u64,
        fehler: TranscriptionError,
    ) -> Result<(), SessionFatalError> {
        let laufend = match self.transkription.take() {
            Some(laufend) if laufend.anfrage == anfrage => laufend,
            andere => {
                self.transkription = andere;
                return Ok(());
            }
        };

        if laufend.versuch == 0 {
            tracing::warn!(fehler = %fehler, "Transkription fehlgeschlagen – neuer Versuch");
            self.transkription_starten(laufend.utterance, 1);
            return Ok(());
        }

        tracing::warn!(fehler = %fehler, "Transkription erneut fehlgeschlagen – Rueckfrage");
        self.fehler_zaehlen()?;
        let text = self.config.rueckfrage.clone();
        self.sprechen(&text, JobArt::Rueckfall);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reasoning
    // -----------------------------------------------------------------------

    fn denken(&mut self) {
        self.naechste_runde += 1;
        let runde = self.naechste_runde;
        let abbruch = CancellationToken::new();

        let reasoner = Arc::clone(&self.reasoner);
        let verlauf = self.verlauf.snapshot();
        let tx = self.ereignis_tx.clone();
        let task_abbruch = abbruch.clone();
        tokio::spawn(async move {
            reasoning_laufen(reasoner, verlauf, runde, task_abbruch, tx).await;
        });

        self.reasoning = Some(LaufendesReasoning {
            runde,
            abbruch,
            chunker: SatzChunker::neu(),
        });
        self.denk_frist = Some(Instant::now() + self.config.denkzeit_limit);
        self.zustand = DialogZustand::Thinking;
    }

    fn reasoning_abbrechen(&mut self) {
        if let Some(laufend) = self.reasoning.take() {
            laufend.abbruch.cancel();
            tracing::debug!(runde = laufend.runde, "Antwortgenerierung abgebrochen");
        }
        self.denk_frist = None;
    }

    fn antwort_delta(&mut self, runde: u64, text: &str) {
        let segmente = match self.reasoning.as_mut() {
            Some(laufend) if laufend.runde == runde => laufend.chunker.push(text),
            _ => return,
        };

        if self.zustand == DialogZustand::Thinking {
            self.denk_frist = None;
            if let Some(seit) = self.final_zeitpunkt.take() {
                self.antwort_latenz = Some(seit.elapsed());
            }
            self.job_erzeugen(JobArt::Antwort);
            self.zustand = DialogZustand::Speaking;
        }
        self.fortschritt_merken();

        if let Some(laufend) = &self.job {
            for segment in segmente {
                laufend.job.segment_senden(segment);
            }
        }
    }

    fn antwort_fertig(&mut self, runde: u64) -> Result<(), SessionFatalError> {
        let mut reasoning = match self.reasoning.take() {
            Some(laufend) if laufend.runde == runde => laufend,
            andere => {
                self.reasoning = andere;
                return Ok(());
            }
        };

        match self.zustand {
            DialogZustand::Speaking => {
                if let Some(laufend) = &self.job {
                    if let Some(rest) = reasoning.chunker.rest() {
                        laufend.job.segment_senden(rest);
                    }
                    laufend.job.abschliessen();
                }
            }
            DialogZustand::Thinking => {
                tracing::warn!(runde, "Leere Antwort vom Modell – Entschuldigung");
                self.denk_frist = None;
                self.fehler_zaehlen()?;
                let text = self.config.entschuldigung.clone();
                self.sprechen(&text, JobArt::Rueckfall);
            }
            _ => {}
        }
        Ok(())
    }

    fn antwort_fehlgeschlagen(
        &mut self,
        runde: u64,
        fehler: ReasoningError,
    ) -> Result<(), SessionFatalError> {
        let mut reasoning = match self.reasoning.take() {
            Some(laufend) if laufend.runde == runde => laufend,
            andere => {
                self.reasoning = andere;
                return Ok(());
            }
        };
        tracing::warn!(runde, fehler = %fehler, zustand = %self.zustand, "Antwortgenerierung fehlgeschlagen");

        match self.zustand {
            DialogZustand::Thinking => {
                self.denk_frist = None;
                self.fehler_zaehlen()?;
                let text = self.config.entschuldigung.clone();
                self.sprechen(&text, JobArt::Rueckfall);
            }
            DialogZustand::Speaking => {
                // Bereits begonnene Antwort zu Ende sprechen
                if let Some(laufend) = &self.job {
                    if let Some(rest) = reasoning.chunker.rest() {
                        laufend.job.segment_senden(rest);
                    }
                    laufend.job.abschliessen();
                }
                self.fehler_zaehlen()?;
            }
            _ => {}
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Synthese
    // -----------------------------------------------------------------------

    fn job_erzeugen(&mut self, art: JobArt) -> SynthesisJob {
        if let Some(alt) = self.job.take() {
            alt.job.abbrechen();
        }
        self.naechster_job += 1;
        let id = JobId(self.naechster_job);
        let job = self
            .synthese
            .job_starten(id, self.playout.clone(), self.ereignis_tx.clone());
        tracing::debug!(job = %id, art = ?art, "Synthese-Job gestartet");
        self.job = Some(LaufenderJob {
            job: job.clone(),
            art,
        });
        job
    }

    /// Spricht einen festen Text als eigenen Job
    fn sprechen(&mut self, text: &str, art: JobArt) {
        let job = self.job_erzeugen(art);
        job.segment_senden(text);
        job.abschliessen();
        self.zustand = DialogZustand::Speaking;
        self.fortschritt_merken();
    }

    /// Setzt die Fortschrittsfrist der Sprachausgabe neu
    fn fortschritt_merken(&mut self) {
        let jetzt = Instant::now();
        self.sprechfortschritt = Some(Sprechfortschritt {
            zuletzt: jetzt,
            gesendet: self.playout.zuletzt_gesendet(),
            pruefung: jetzt + FORTSCHRITT_INTERVALL.min(self.config.denkzeit_limit),
        });
    }

    /// Weder Text noch Audio kommen nach: Antwort beenden, ggf. Entschuldigung
    fn ausgabe_stockt(&mut self) -> Result<(), SessionFatalError> {
        tracing::warn!(
            limit_ms = self.config.denkzeit_limit.as_millis() as u64,
            "Sprachausgabe ohne Fortschritt, Antwort wird beendet"
        );
        self.reasoning_abbrechen();
        self.sprechfortschritt = None;
        let Some(laufend) = self.job.take() else {
            self.zuhoeren();
            return Ok(());
        };
        laufend.job.abbrechen();
        let gesprochen = laufend.job.gesprochener_text(self.playout.zuletzt_gesendet());
        let stumm = gesprochen.is_empty();
        self.agent_runde(gesprochen);
        self.playout.leeren();
        self.fehler_zaehlen()?;

        if stumm && laufend.art != JobArt::Rueckfall {
            let text = self.config.entschuldigung.clone();
            self.sprechen(&text, JobArt::Rueckfall);
        } else {
            self.zuhoeren();
        }
        Ok(())
    }

    fn synthese_fertig(&mut self, id: JobId) {
        let laufend = match self.job.take() {
            Some(laufend) if laufend.job.id() == id => laufend,
            andere => {
                self.job = andere;
                return;
            }
        };

        self.agent_runde(laufend.job.vollstaendiger_text());
        if laufend.art != JobArt::Rueckfall {
            self.fehler_in_folge = 0;
        }
        if self.zustand == DialogZustand::Speaking && self.reasoning.is_none() {
            self.zuhoeren();
        }
    }

    fn synthese_fehlgeschlagen(
        &mut self,
        id: JobId,
        fehler: SynthesisError,
    ) -> Result<(), SessionFatalError> {
        let laufend = match self.job.take() {
            Some(laufend) if laufend.job.id() == id => laufend,
            andere => {
                self.job = andere;
                return Ok(());
            }
        };
        tracing::warn!(job = %id, fehler = %fehler, "Sprachsynthese fehlgeschlagen");

        let gesprochen = laufend.job.gesprochener_text(self.playout.zuletzt_gesendet());
        self.agent_runde(gesprochen);
        self.reasoning_abbrechen();
        self.fehler_zaehlen()?;

        if laufend.art == JobArt::Rueckfall {
            self.zuhoeren();
        } else {
            let text = self.config.entschuldigung.clone();
            self.sprechen(&text, JobArt::Rueckfall);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hilfsfunktionen
    // -----------------------------------------------------------------------

    /// Wechsel nach `Listening`; gehaltene Aeusserung wird jetzt transkribiert
    fn zuhoeren(&mut self) {
        self.zustand = DialogZustand::Listening;
        self.leerlauf_seit = Instant::now();
        self.denk_frist = None;
        self.sprechfortschritt = None;
        if self.transkription.is_none() {
            if let Some(gehalten) = self.gehalten.take() {
                self.transkription_starten(Arc::new(gehalten), 0);
            }
        }
    }

    fn agent_runde(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        self.verlauf.anhaengen(Rolle::Agent, text);
        self.statistik.agent_runden += 1;
    }

    fn fehler_zaehlen(&mut self) -> Result<(), SessionFatalError> {
        self.fehler_in_folge += 1;
        self.statistik.faehigkeits_fehler += 1;
        if self.fehler_in_folge >= self.config.max_fehler_in_folge {
            tracing::error!(
                anzahl = self.fehler_in_folge,
                "Zu viele Faehigkeits-Fehler in Folge"
            );
            return Err(SessionFatalError::FaehigkeitErschoepft {
                anzahl: self.fehler_in_folge,
            });
        }
        Ok(())
    }
}

impl Drop for DialogSession {
    fn drop(&mut self) {
        if let Some(laufend) = &self.job {
            laufend.job.abbrechen();
        }
        if let Some(laufend) = &self.reasoning {
            laufend.abbruch.cancel();
        }
        if let Some(laufend) = &self.transkription {
            laufend.abbruch.cancel();
        }
    }
}

/// Task einer Antwortgenerierung: leitet Deltas als Ereignisse weiter
async fn reasoning_laufen(
    reasoner: Arc<dyn Reasoner>,
    verlauf: Vec<Turn>,
    runde: u64,
    abbruch: CancellationToken,
    tx: mpsc::Sender<DialogEreignis>,
) {
    let geoeffnet = tokio::select! {
        biased;
        _ = abbruch.cancelled() => return,
        r = reasoner.antworten(&verlauf) => r,
    };
    let mut strom = match geoeffnet {
        Ok(strom) => strom,
        Err(fehler) => {
            let _ = tx.send(DialogEreignis::AntwortFehler { runde, fehler }).await;
            return;
        }
    };

    loop {
        let teil = tokio::select! {
            biased;
            _ = abbruch.cancelled() => return,
            t = strom.next() => t,
        };
        let (ereignis, ende) = match teil {
            Some(Ok(text)) => (DialogEreignis::AntwortDelta { runde, text }, false),
            Some(Err(fehler)) => (DialogEreignis::AntwortFehler { runde, fehler }, true),
            None => (DialogEreignis::AntwortFertig { runde }, true),
        };
        if tx.send(ereignis).await.is_err() || ende {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::TranskriptTeil;
    use crate::synthesis::JobZustand;
    use crate::testhilfen::{MockReasoner, MockStt, MockTts, ReasonerVerhalten};
    use voxcall_audio::AudioFrame;
    use voxcall_core::UtteranceId;
    use voxcall_voice::{Pacer, PacerAusgabe};

    struct Aufbau {
        dialog: DialogSession,
        rx: mpsc::Receiver<DialogEreignis>,
        playout: PlayoutBuffer,
        stt: Arc<MockStt>,
        tts: Arc<MockTts>,
        reasoner: Arc<MockReasoner>,
        _pacer_abbruch: tokio_util::sync::DropGuard,
    }

    fn aufbau(config: DialogConfig, stt: MockStt, tts: MockTts, reasoner: MockReasoner) -> Aufbau {
        let stt = Arc::new(stt);
        let tts = Arc::new(tts);
        let reasoner = Arc::new(reasoner);
        let playout = PlayoutBuffer::standard();

        // Taktgeber mit Senke, damit Jobs ausgespielt werden
        let (pacer_tx, mut pacer_rx) = mpsc::channel::<PacerAusgabe>(64);
        let abbruch = CancellationToken::new();
        Pacer::neu(playout.clone()).starten(pacer_tx, abbruch.clone());
        tokio::spawn(async move { while pacer_rx.recv().await.is_some() {} });

        let (dialog, rx) = DialogSession::neu(
            config,
            Capabilities::neu(stt.clone(), tts.clone(), reasoner.clone()),
            VoiceConfig::default(),
            playout.clone(),
        );
        Aufbau {
            dialog,
            rx,
            playout,
            stt,
            tts,
            reasoner,
            _pacer_abbruch: abbruch.drop_guard(),
        }
    }

    fn ohne_begruessung() -> DialogConfig {
        DialogConfig {
            begruessung: None,
            ..DialogConfig::default()
        }
    }

    fn utterance(id: u64) -> Utterance {
        let frames = (0..10)
            .map(|seq| AudioFrame::aufgefuellt(seq, &[3000; 160], Instant::now()))
            .collect();
        Utterance::neu(UtteranceId(id), frames)
    }

    /// Fuehrt Ereignisse und Fristen zurueck in die Maschine, bis `bedingung` gilt
    async fn pumpen_bis(
        a: &mut Aufbau,
        max: Duration,
        bedingung: impl Fn(&DialogSession) -> bool,
    ) -> Result<(), SessionFatalError> {
        let ende = Instant::now() + max;
        while !bedingung(&a.dialog) {
            let frist = a.dialog.naechste_frist().map_or(ende, |f| f.min(ende));
            tokio::select! {
                Some(ereignis) = a.rx.recv() => a.dialog.verarbeiten(ereignis)?,
                _ = tokio::time::sleep_until(frist) => {
                    a.dialog.frist_pruefen(Instant::now())?;
                    assert!(Instant::now() < ende || bedingung(&a.dialog), "Bedingung nicht erreicht");
                }
            }
        }
        Ok(())
    }

    fn im_zustand(z: DialogZustand) -> impl Fn(&DialogSession) -> bool {
        move |d| d.zustand() == z
    }

    #[tokio::test(start_paused = true)]
    async fn begruessung_wird_gesprochen_und_protokolliert() {
        let mut a = aufbau(
            DialogConfig::default(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::neu(&["Hi."]),
        );
        a.dialog.starten();
        assert_eq!(a.dialog.zustand(), DialogZustand::Speaking);
        assert!(a.dialog.agent_aktiv());

        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();

        let verlauf = a.dialog.verlauf().snapshot();
        assert_eq!(verlauf.len(), 1);
        assert_eq!(verlauf[0].rolle, Rolle::Agent);
        assert!(verlauf[0].text.starts_with("Hello!"));
        assert_eq!(a.tts.texte().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn volle_runde_zuhoeren_denken_sprechen() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("what time is it"),
            MockTts::neu(3),
            MockReasoner::neu(&["It is half past ", "three in the afternoon. ", "Anything else?"]),
        );
        a.dialog.starten();
        assert_eq!(a.dialog.zustand(), DialogZustand::Listening);

        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        assert!(a.dialog.antwort_latenz_abholen().is_some());

        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();

        let verlauf = a.dialog.verlauf().snapshot();
        assert_eq!(verlauf.len(), 2);
        assert_eq!(verlauf[0].rolle, Rolle::Benutzer);
        assert_eq!(verlauf[0].text, "what time is it");
        assert_eq!(verlauf[1].rolle, Rolle::Agent);
        assert_eq!(verlauf[1].text, "It is half past three in the afternoon. Anything else?");
        assert_eq!(
            a.tts.texte(),
            vec!["It is half past three in the afternoon.", "Anything else?"]
        );
        assert_eq!(a.reasoner.verlaeufe()[0].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn barge_in_beim_sprechen_bricht_ab() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("tell me a story"),
            MockTts::neu(50),
            MockReasoner::neu(&["Once upon a time there was a dragon. ", "It was very old and tired."]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();

        // Etwas Audio ausspielen lassen
        let ende = Instant::now() + Duration::from_millis(200);
        pumpen_bis(&mut a, Duration::from_millis(200), |_| Instant::now() >= ende)
            .await
            .unwrap();
        let job = a.dialog.aktiver_job().expect("Job muss laufen");

        a.dialog.verarbeiten(DialogEreignis::BargeIn).unwrap();
        assert_eq!(job.zustand(), JobZustand::Cancelled);
        assert_eq!(a.dialog.zustand(), DialogZustand::Listening);
        assert_eq!(a.playout.fuellstand(), 0);

        // Zweites Barge-In hat keine Wirkung
        a.dialog.verarbeiten(DialogEreignis::BargeIn).unwrap();
        assert_eq!(a.dialog.statistik().barge_ins, 1);

        // Nach dem Abbruch kommt kein Audio des alten Jobs mehr in den Puffer
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(a.playout.fuellstand(), 0);

        // Kein Satz wurde vollstaendig ausgespielt
        assert_eq!(a.dialog.verlauf().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn barge_in_beim_denken_bricht_reasoning_ab() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::mit_verhalten(vec![ReasonerVerhalten::Haengen]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Thinking))
            .await
            .unwrap();

        a.dialog.verarbeiten(DialogEreignis::BargeIn).unwrap();
        assert_eq!(a.dialog.zustand(), DialogZustand::Listening);
        assert!(a.dialog.naechste_frist().is_some());
        assert!(a.tts.texte().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn denkzeit_ueberschritten_fuehrt_zu_entschuldigung() {
        let config = ohne_begruessung();
        let entschuldigung = config.entschuldigung.clone();
        let mut a = aufbau(
            config,
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::mit_verhalten(vec![ReasonerVerhalten::Haengen]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Thinking))
            .await
            .unwrap();
        let beginn = Instant::now();

        pumpen_bis(&mut a, Duration::from_secs(20), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        assert!(Instant::now() - beginn >= Duration::from_secs(15));
        assert!(Instant::now() - beginn < Duration::from_secs(16));

        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();
        assert_eq!(a.tts.texte(), vec![entschuldigung]);
    }

    #[tokio::test(start_paused = true)]
    async fn transkription_wird_einmal_wiederholt_dann_rueckfrage() {
        let config = ohne_begruessung();
        let rueckfrage = config.rueckfrage.clone();
        let stt = MockStt::neu("hello")
            .mit_fehler(TranscriptionError::Zeitlimit)
            .mit_fehler(TranscriptionError::Verbindung("reset".into()));
        let mut a = aufbau(config, stt, MockTts::neu(3), MockReasoner::neu(&["Hi."]));
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();

        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();

        assert_eq!(a.stt.aufrufe(), 2);
        assert_eq!(a.tts.texte(), vec![rueckfrage]);
        assert_eq!(a.reasoner.aufrufe(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gehaltene_aeusserung_wird_nach_rueckkehr_transkribiert() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::mit_verhalten(vec![ReasonerVerhalten::Haengen]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Thinking))
            .await
            .unwrap();

        // Aeusserung endet waehrend Thinking: wird gehalten
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(2))).unwrap();
        assert_eq!(a.stt.aufrufe(), 1);

        a.dialog.verarbeiten(DialogEreignis::BargeIn).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), |d| {
            d.statistik().transkriptionen == 2
        })
        .await
        .unwrap();
        assert_eq!(a.stt.aufrufe(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn veraltetes_transkript_wird_verworfen() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::neu(&["Hi."]),
        );
        a.dialog.starten();
        let veraltet = Transcript {
            utterance_id: UtteranceId(99),
            text: "stale".into(),
            konfidenz: 1.0,
            art: crate::transcription::TranskriptArt::Final,
        };
        a.dialog
            .verarbeiten(DialogEreignis::Transkript {
                anfrage: 42,
                transcript: veraltet,
            })
            .unwrap();
        assert_eq!(a.dialog.zustand(), DialogZustand::Listening);
        assert!(a.dialog.verlauf().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn leerlauf_schliesst_genau_einmal() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::neu(&["Hi."]),
        );
        a.dialog.starten();
        let beginn = Instant::now();

        pumpen_bis(&mut a, Duration::from_secs(130), im_zustand(DialogZustand::Closing))
            .await
            .unwrap();
        assert_eq!(Instant::now() - beginn, Duration::from_secs(120));
        assert_eq!(a.dialog.schliess_grund(), Some(&SchliessGrund::Leerlauf));
        assert_eq!(a.dialog.freigaben(), 1);

        assert!(!a.dialog.schliessen(SchliessGrund::Shutdown));
        a.dialog.verarbeiten(DialogEreignis::BargeIn).unwrap();
        assert_eq!(a.dialog.freigaben(), 1);
        assert_eq!(a.dialog.schliess_grund(), Some(&SchliessGrund::Leerlauf));
    }

    #[tokio::test(start_paused = true)]
    async fn gehaeufte_fehler_sind_fatal() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(2),
            MockReasoner::mit_verhalten(vec![
                ReasonerVerhalten::Fehler(ReasoningError::Zeitlimit),
                ReasonerVerhalten::Fehler(ReasoningError::Zeitlimit),
                ReasonerVerhalten::Fehler(ReasoningError::Zeitlimit),
            ]),
        );
        a.dialog.starten();

        for runde in 1..=2u64 {
            a.dialog
                .verarbeiten(DialogEreignis::UtteranceFertig(utterance(runde)))
                .unwrap();
            pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
                .await
                .unwrap();
            pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
                .await
                .unwrap();
        }

        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(3))).unwrap();
        let ergebnis =
            pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking)).await;
        assert_eq!(
            ergebnis,
            Err(SessionFatalError::FaehigkeitErschoepft { anzahl: 3 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stockende_antwort_wird_nach_frist_beendet() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::mit_verhalten(vec![ReasonerVerhalten::Stocken(vec![
                "Okay, let me think. ".to_string(),
            ])]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        let beginn = Instant::now();

        pumpen_bis(&mut a, Duration::from_secs(30), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();
        let dauer = Instant::now() - beginn;
        assert!(dauer >= Duration::from_secs(15));
        assert!(dauer < Duration::from_secs(17));

        // Der gesprochene Satz bleibt im Verlauf, eine Entschuldigung gibt es nicht
        let verlauf = a.dialog.verlauf().snapshot();
        assert_eq!(verlauf.len(), 2);
        assert_eq!(verlauf[1].rolle, Rolle::Agent);
        assert_eq!(verlauf[1].text, "Okay, let me think.");
        assert_eq!(a.tts.texte(), vec!["Okay, let me think."]);
        assert_eq!(a.dialog.statistik().faehigkeits_fehler, 1);
        assert!(a.dialog.aktiver_job().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn haengende_transkription_wird_nach_frist_wiederholt() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello").mit_haengen(),
            MockTts::neu(3),
            MockReasoner::neu(&["Hi there."]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        let beginn = Instant::now();

        pumpen_bis(&mut a, Duration::from_secs(20), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        assert!(Instant::now() - beginn >= Duration::from_secs(15));
        assert_eq!(a.stt.aufrufe(), 2);
        assert_eq!(a.dialog.verlauf().snapshot()[0].text, "hello");
        assert_eq!(a.dialog.statistik().faehigkeits_fehler, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zweimal_haengende_transkription_fuehrt_zu_rueckfrage() {
        let config = ohne_begruessung();
        let rueckfrage = config.rueckfrage.clone();
        let mut a = aufbau(
            config,
            MockStt::neu("hello").mit_haengen().mit_haengen(),
            MockTts::neu(3),
            MockReasoner::neu(&["Hi there."]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        let beginn = Instant::now();

        pumpen_bis(&mut a, Duration::from_secs(40), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        assert!(Instant::now() - beginn >= Duration::from_secs(30));
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();

        assert_eq!(a.stt.aufrufe(), 2);
        assert_eq!(a.tts.texte(), vec![rueckfrage]);
        assert_eq!(a.reasoner.aufrufe(), 0);
        assert_eq!(a.dialog.statistik().faehigkeits_fehler, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn synthese_fehler_der_antwort_fuehrt_zu_entschuldigung() {
        let config = ohne_begruessung();
        let entschuldigung = config.entschuldigung.clone();
        let mut a = aufbau(
            config,
            MockStt::neu("hello"),
            MockTts::neu(3).mit_fehlern(1),
            MockReasoner::neu(&["Sure, I can help with that. "]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();

        // Die gescheiterte Antwort hinterlaesst nichts im Verlauf
        let verlauf = a.dialog.verlauf().snapshot();
        assert_eq!(verlauf.len(), 2);
        assert_eq!(verlauf[1].text, entschuldigung);
        assert_eq!(a.tts.texte(), vec![entschuldigung]);
        assert_eq!(a.dialog.statistik().faehigkeits_fehler, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gescheiterte_entschuldigung_kehrt_still_zum_zuhoeren_zurueck() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3).mit_fehlern(2),
            MockReasoner::neu(&["Sure, I can help with that. "]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();

        assert!(a.tts.texte().is_empty());
        assert_eq!(a.dialog.verlauf().len(), 1);
        assert_eq!(a.dialog.statistik().faehigkeits_fehler, 2);
        assert!(a.dialog.aktiver_job().is_none());
        assert!(a.dialog.naechste_frist().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn teil_transkripte_vor_dem_finalen() {
        let stt = MockStt::neu("unused").mit_teilen(vec![
            TranskriptTeil::partiell("what", 0.4),
            TranskriptTeil::partiell("what time", 0.6),
            TranskriptTeil::final_("what time is it", 0.9),
        ]);
        let mut a = aufbau(ohne_begruessung(), stt, MockTts::neu(3), MockReasoner::neu(&["Noon."]));
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();

        pumpen_bis(&mut a, Duration::from_secs(5), |d| {
            d.letzter_partiell() == Some("what time")
        })
        .await
        .unwrap();
        assert_eq!(a.dialog.zustand(), DialogZustand::Listening);
        assert!(a.dialog.verlauf().is_empty());

        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Thinking))
            .await
            .unwrap();
        assert_eq!(a.dialog.letzter_partiell(), None);
        let verlauf = a.dialog.verlauf().snapshot();
        assert_eq!(verlauf.len(), 1);
        assert_eq!(verlauf[0].text, "what time is it");
        assert_eq!(a.dialog.statistik().transkriptionen, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn verzoegerte_antwort_innerhalb_der_denkzeit() {
        let mut a = aufbau(
            ohne_begruessung(),
            MockStt::neu("hello"),
            MockTts::neu(3),
            MockReasoner::mit_verhalten(vec![ReasonerVerhalten::Verzoegert(
                Duration::from_secs(5),
                vec!["Here you go.".to_string()],
            )]),
        );
        a.dialog.starten();
        a.dialog.verarbeiten(DialogEreignis::UtteranceFertig(utterance(1))).unwrap();
        pumpen_bis(&mut a, Duration::from_secs(10), im_zustand(DialogZustand::Speaking))
            .await
            .unwrap();
        let latenz = a.dialog.antwort_latenz_abholen().expect("Latenz erwartet");
        assert!(latenz >= Duration::from_secs(5));

        pumpen_bis(&mut a, Duration::from_secs(5), im_zustand(DialogZustand::Listening))
            .await
            .unwrap();
        assert_eq!(a.tts.texte(), vec!["Here you go."]);
        assert_eq!(a.dialog.statistik().faehigkeits_fehler, 0);
    }
}

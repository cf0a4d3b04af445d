//! In-Memory-Faehigkeiten fuer Tests
//!
//! Deterministische Gegenstuecke zu den HTTP-Anbietern. Aktiv in den
//! eigenen Unit-Tests und fuer andere Crates ueber das Feature `testhilfen`.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voxcall_audio::{Utterance, SAMPLES_PRO_FRAME};

use crate::capability::{
    Capabilities, PcmStream, Reasoner, SpeechToText, TextDeltaStream, TextToSpeech,
    TranskriptTeil, TranskriptTeilStream, VoiceConfig,
};
use crate::error::{ReasoningError, SynthesisError, TranscriptionError};
use crate::history::Turn;

// ---------------------------------------------------------------------------
// STT
// ---------------------------------------------------------------------------

enum SttAntwort {
    Teile(Vec<TranskriptTeil>),
    Fehler(TranscriptionError),
    Haengen,
}

/// STT mit vorgegebenen Antworten; danach immer `standard` als finales Ergebnis
pub struct MockStt {
    antworten: Mutex<VecDeque<SttAntwort>>,
    standard: String,
    aufrufe: AtomicUsize,
}

impl MockStt {
    pub fn neu(standard: impl Into<String>) -> Self {
        Self {
            antworten: Mutex::new(VecDeque::new()),
            standard: standard.into(),
            aufrufe: AtomicUsize::new(0),
        }
    }

    pub fn mit_teilen(self, teile: Vec<TranskriptTeil>) -> Self {
        self.antworten.lock().push_back(SttAntwort::Teile(teile));
        self
    }

    pub fn mit_fehler(self, fehler: TranscriptionError) -> Self {
        self.antworten.lock().push_back(SttAntwort::Fehler(fehler));
        self
    }

    /// Der naechste Aufruf liefert nie ein Ergebnis
    pub fn mit_haengen(self) -> Self {
        self.antworten.lock().push_back(SttAntwort::Haengen);
        self
    }

    pub fn aufrufe(&self) -> usize {
        self.aufrufe.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transkribieren(
        &self,
        _utterance: &Utterance,
    ) -> Result<TranskriptTeilStream, TranscriptionError> {
        self.aufrufe.fetch_add(1, Ordering::SeqCst);
        let antwort = self.antworten.lock().pop_front();
        match antwort {
            Some(SttAntwort::Teile(teile)) => Ok(stream::iter(teile.into_iter().map(Ok)).boxed()),
            Some(SttAntwort::Fehler(fehler)) => Err(fehler),
            Some(SttAntwort::Haengen) => Ok(stream::pending().boxed()),
            None => Ok(stream::iter(vec![Ok(TranskriptTeil::final_(
                self.standard.clone(),
                0.95,
            ))])
            .boxed()),
        }
    }
}

// ---------------------------------------------------------------------------
// TTS
// ---------------------------------------------------------------------------

/// TTS, die pro Text eine feste Anzahl lauter Frames liefert
pub struct MockTts {
    frames_pro_text: usize,
    fehler_ausstehend: Mutex<u32>,
    texte: Mutex<Vec<String>>,
}

impl MockTts {
    pub fn neu(frames_pro_text: usize) -> Self {
        Self {
            frames_pro_text,
            fehler_ausstehend: Mutex::new(0),
            texte: Mutex::new(Vec::new()),
        }
    }

    /// Die naechsten `anzahl` Aufrufe schlagen fehl
    pub fn mit_fehlern(self, anzahl: u32) -> Self {
        *self.fehler_ausstehend.lock() = anzahl;
        self
    }

    /// Alle bisher synthetisierten Texte
    pub fn texte(&self) -> Vec<String> {
        self.texte.lock().clone()
    }
}

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthetisieren(
        &self,
        text: &str,
        _stimme: &VoiceConfig,
    ) -> Result<PcmStream, SynthesisError> {
        {
            let mut ausstehend = self.fehler_ausstehend.lock();
            if *ausstehend > 0 {
                *ausstehend -= 1;
                return Err(SynthesisError::Anbieter {
                    status: 503,
                    nachricht: "nicht verfuegbar".into(),
                });
            }
        }
        self.texte.lock().push(text.to_string());
        let bloecke: Vec<Result<Vec<i16>, SynthesisError>> = (0..self.frames_pro_text)
            .map(|_| Ok(vec![4000i16; SAMPLES_PRO_FRAME]))
            .collect();
        Ok(stream::iter(bloecke).boxed())
    }
}

// ---------------------------------------------------------------------------
// Reasoner
// ---------------------------------------------------------------------------

/// Verhalten des Mock-Reasoners fuer einen Aufruf
#[derive(Debug, Clone)]
pub enum ReasonerVerhalten {
    Antwort(Vec<String>),
    Fehler(ReasoningError),
    /// Antwortet nie
    Haengen,
    /// Antwortet nach einer Pause
    Verzoegert(Duration, Vec<String>),
    /// Liefert die Deltas, danach kommt nichts mehr
    Stocken(Vec<String>),
}

/// Reasoner mit vorgegebenem Verhalten; danach immer die Standard-Antwort
pub struct MockReasoner {
    verhalten: Mutex<VecDeque<ReasonerVerhalten>>,
    standard: Vec<String>,
    verlaeufe: Mutex<Vec<Vec<Turn>>>,
}

impl MockReasoner {
    pub fn neu(deltas: &[&str]) -> Self {
        Self {
            verhalten: Mutex::new(VecDeque::new()),
            standard: deltas.iter().map(|d| d.to_string()).collect(),
            verlaeufe: Mutex::new(Vec::new()),
        }
    }

    pub fn mit_verhalten(verhalten: Vec<ReasonerVerhalten>) -> Self {
        Self {
            verhalten: Mutex::new(verhalten.into()),
            standard: vec!["Okay.".to_string()],
            verlaeufe: Mutex::new(Vec::new()),
        }
    }

    pub fn aufrufe(&self) -> usize {
        self.verlaeufe.lock().len()
    }

    /// Die Verlaeufe aller bisherigen Aufrufe
    pub fn verlaeufe(&self) -> Vec<Vec<Turn>> {
        self.verlaeufe.lock().clone()
    }
}

fn delta_stream(deltas: Vec<String>) -> TextDeltaStream {
    stream::iter(deltas.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn antworten(&self, verlauf: &[Turn]) -> Result<TextDeltaStream, ReasoningError> {
        self.verlaeufe.lock().push(verlauf.to_vec());
        let verhalten = self.verhalten.lock().pop_front();
        match verhalten.unwrap_or_else(|| ReasonerVerhalten::Antwort(self.standard.clone())) {
            ReasonerVerhalten::Antwort(deltas) => Ok(delta_stream(deltas)),
            ReasonerVerhalten::Fehler(fehler) => Err(fehler),
            ReasonerVerhalten::Haengen => Ok(stream::pending().boxed()),
            ReasonerVerhalten::Verzoegert(pause, deltas) => {
                tokio::time::sleep(pause).await;
                Ok(delta_stream(deltas))
            }
            ReasonerVerhalten::Stocken(deltas) => {
                Ok(delta_stream(deltas).chain(stream::pending()).boxed())
            }
        }
    }
}

/// Buendelt die drei Mocks
pub fn capabilities(stt: Arc<MockStt>, tts: Arc<MockTts>, reasoner: Arc<MockReasoner>) -> Capabilities {
    Capabilities::neu(stt, tts, reasoner)
}

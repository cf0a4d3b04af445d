//! Sprachsynthese-Adapter und Synthese-Jobs
//!
//! [`SynthesisAdapter::stream_text`] rahmt die PCM-Bloecke des Anbieters in
//! 160-Sample-Frames mit fortlaufender Ausgangs-Sequenznummer der Session.
//!
//! Ein [`SynthesisJob`] ist eine Agent-Antwort: Text-Segmente kommen
//! nach und nach (Satz fuer Satz vom LLM), der Job-Task synthetisiert sie
//! der Reihe nach und reiht die Frames in den Ausgangspuffer ein. Wartet
//! der Task auf Platz im Puffer, dann in seinem eigenen Task.
//!
//! Abbruch ist kooperativ: geprueft zwischen zwei Anbieter-Bloecken und
//! vor jedem Einreihen.

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use voxcall_audio::{AudioFrame, SAMPLES_PRO_FRAME};
use voxcall_core::JobId;
use voxcall_voice::{Einreihung, PlayoutBuffer};

use crate::capability::{PcmStream, TextToSpeech, VoiceConfig};
use crate::ereignis::DialogEreignis;
use crate::error::SynthesisError;

// ---------------------------------------------------------------------------
// Frame-Strom eines Textes
// ---------------------------------------------------------------------------

enum StromZustand {
    Bereit,
    Laufend(PcmStream),
    Beendet,
}

/// Lazy Strom von Ausgangs-Frames fuer einen Text
pub struct SyntheseStream {
    tts: Arc<dyn TextToSpeech>,
    text: String,
    stimme: VoiceConfig,
    sequenz: Arc<AtomicU64>,
    abbruch: CancellationToken,
    zustand: StromZustand,
    rest: Vec<i16>,
    fertig: VecDeque<AudioFrame>,
}

impl SyntheseStream {
    /// Naechster Frame; `None` am Ende oder nach Abbruch
    pub async fn naechster_frame(&mut self) -> Option<Result<AudioFrame, SynthesisError>> {
        loop {
            if self.abbruch.is_cancelled() {
                self.zustand = StromZustand::Beendet;
                self.fertig.clear();
                return None;
            }
            if let Some(frame) = self.fertig.pop_front() {
                return Some(Ok(frame));
            }

            match &mut self.zustand {
                StromZustand::Beendet => return None,

                StromZustand::Bereit => {
                    let geoeffnet = tokio::select! {
                        biased;
                        _ = self.abbruch.cancelled() => None,
                        r = self.tts.synthetisieren(&self.text, &self.stimme) => Some(r),
                    };
                    match geoeffnet {
                        None => continue,
                        Some(Ok(strom)) => self.zustand = StromZustand::Laufend(strom),
                        Some(Err(e)) => {
                            self.zustand = StromZustand::Beendet;
                            return Some(Err(e));
                        }
                    }
                }

                StromZustand::Laufend(strom) => {
                    let block = tokio::select! {
                        biased;
                        _ = self.abbruch.cancelled() => None,
                        b = strom.next() => Some(b),
                    };
                    match block {
                        None => continue,
                        Some(Some(Ok(pcm))) => self.rahmen(&pcm),
                        Some(Some(Err(e))) => {
                            self.zustand = StromZustand::Beendet;
                            return Some(Err(e));
                        }
                        Some(None) => {
                            self.zustand = StromZustand::Beendet;
                            self.letzten_rahmen();
                        }
                    }
                }
            }
        }
    }

    fn rahmen(&mut self, pcm: &[i16]) {
        self.rest.extend_from_slice(pcm);
        while self.rest.len() >= SAMPLES_PRO_FRAME {
            let samples: Vec<i16> = self.rest.drain(..SAMPLES_PRO_FRAME).collect();
            self.frame_ausgeben(&samples);
        }
    }

    /// Restliche Samples mit Stille auf einen ganzen Frame auffuellen
    fn letzten_rahmen(&mut self) {
        if !self.rest.is_empty() {
            let samples = std::mem::take(&mut self.rest);
            self.frame_ausgeben(&samples);
        }
    }

    fn frame_ausgeben(&mut self, samples: &[i16]) {
        let seq = self.sequenz.fetch_add(1, Ordering::Relaxed);
        self.fertig
            .push_back(AudioFrame::aufgefuellt(seq, samples, Instant::now()));
    }
}

// ---------------------------------------------------------------------------
// SynthesisJob
// ---------------------------------------------------------------------------

/// Zustand eines Synthese-Jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobZustand {
    Pending,
    Streaming,
    Cancelled,
    Done,
}

#[derive(Debug)]
struct Segment {
    text: String,
    /// Sequenznummer des letzten eingereihten Frames
    letzte_seq: Option<u64>,
}

struct JobInner {
    id: JobId,
    zustand: Mutex<JobZustand>,
    abbruch: CancellationToken,
    segment_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Vollstaendig eingereihte Segmente
    segmente: Mutex<Vec<Segment>>,
}

/// Handle auf einen laufenden Synthese-Job (`Clone` teilt den Zustand)
#[derive(Clone)]
pub struct SynthesisJob {
    inner: Arc<JobInner>,
}

impl SynthesisJob {
    fn neu(id: JobId) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let job = Self {
            inner: Arc::new(JobInner {
                id,
                zustand: Mutex::new(JobZustand::Pending),
                abbruch: CancellationToken::new(),
                segment_tx: Mutex::new(Some(tx)),
                segmente: Mutex::new(Vec::new()),
            }),
        };
        (job, rx)
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn zustand(&self) -> JobZustand {
        *self.inner.zustand.lock()
    }

    /// Haengt ein Text-Segment an; `false` wenn der Job keine Segmente mehr annimmt
    pub fn segment_senden(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text.trim().is_empty() {
            return true;
        }
        match self.inner.segment_tx.lock().as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        }
    }

    /// Keine weiteren Segmente; der Job endet nach dem letzten
    pub fn abschliessen(&self) {
        self.inner.segment_tx.lock().take();
    }

    /// Bricht den Job ab (idempotent); `true` beim ersten wirksamen Aufruf
    pub fn abbrechen(&self) -> bool {
        let mut zustand = self.inner.zustand.lock();
        if matches!(*zustand, JobZustand::Cancelled | JobZustand::Done) {
            return false;
        }
        *zustand = JobZustand::Cancelled;
        drop(zustand);

        self.inner.abbruch.cancel();
        self.inner.segment_tx.lock().take();
        tracing::debug!(job = %self.inner.id, "Synthese-Job abgebrochen");
        true
    }

    /// Text der Segmente, deren letzter Frame bis `zuletzt_gesendet` ausgespielt wurde
    pub fn gesprochener_text(&self, zuletzt_gesendet: Option<u64>) -> String {
        let Some(bis) = zuletzt_gesendet else {
            return String::new();
        };
        let segmente = self.inner.segmente.lock();
        segmente
            .iter()
            .take_while(|s| s.letzte_seq.is_some_and(|seq| seq <= bis))
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Text aller vollstaendig eingereihten Segmente
    pub fn vollstaendiger_text(&self) -> String {
        let segmente = self.inner.segmente.lock();
        segmente
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn streaming_setzen(&self) {
        let mut zustand = self.inner.zustand.lock();
        if *zustand == JobZustand::Pending {
            *zustand = JobZustand::Streaming;
        }
    }

    fn fertig_markieren(&self) -> bool {
        let mut zustand = self.inner.zustand.lock();
        if matches!(*zustand, JobZustand::Pending | JobZustand::Streaming) {
            *zustand = JobZustand::Done;
            return true;
        }
        false
    }

    fn segment_erfassen(&self, text: String, letzte_seq: Option<u64>) {
        self.inner.segmente.lock().push(Segment { text, letzte_seq });
    }
}

// ---------------------------------------------------------------------------
// SynthesisAdapter
// ---------------------------------------------------------------------------

/// Adapter zwischen Dialog und TTS-Anbieter
#[derive(Clone)]
pub struct SynthesisAdapter {
    tts: Arc<dyn TextToSpeech>,
    stimme: VoiceConfig,
    /// Ausgangs-Sequenzzaehler der Session
    sequenz: Arc<AtomicU64>,
}

impl SynthesisAdapter {
    pub fn neu(tts: Arc<dyn TextToSpeech>, stimme: VoiceConfig) -> Self {
        Self {
            tts,
            stimme,
            sequenz: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Erzeugt den (noch nicht gestarteten) Frame-Strom eines Textes
    pub fn stream_text(
        &self,
        text: &str,
        stimme: &VoiceConfig,
        abbruch: CancellationToken,
    ) -> SyntheseStream {
        SyntheseStream {
            tts: Arc::clone(&self.tts),
            text: text.to_string(),
            stimme: stimme.clone(),
            sequenz: Arc::clone(&self.sequenz),
            abbruch,
            zustand: StromZustand::Bereit,
            rest: Vec::new(),
            fertig: VecDeque::new(),
        }
    }

    /// Startet einen Job, der Segmente synthetisiert und in `playout` einreiht
    ///
    /// Meldet `SyntheseFertig` erst, wenn alle Frames an den Taktgeber
    /// abgegeben wurden, oder `SyntheseFehler`. Ein abgebrochener Job meldet nichts.
    pub fn job_starten(
        &self,
        id: JobId,
        playout: PlayoutBuffer,
        ereignisse: mpsc::Sender<DialogEreignis>,
    ) -> SynthesisJob {
        let (job, segmente) = SynthesisJob::neu(id);
        playout.job_aktivieren(id);

        let adapter = self.clone();
        let task_job = job.clone();
        tokio::spawn(async move {
            adapter
                .job_laufen(task_job, segmente, playout, ereignisse)
                .await;
        });
        job
    }

    async fn job_laufen(
        self,
        job: SynthesisJob,
        mut segmente: mpsc::UnboundedReceiver<String>,
        playout: PlayoutBuffer,
        ereignisse: mpsc::Sender<DialogEreignis>,
    ) {
        let abbruch = job.inner.abbruch.clone();
        let id = job.id();

        loop {
            let segment = tokio::select! {
                biased;
                _ = abbruch.cancelled() => return,
                s = segmente.recv() => s,
            };
            let Some(text) = segment else { break };

            job.streaming_setzen();
            let mut strom = self.stream_text(&text, &self.stimme, abbruch.clone());
            let mut letzte_seq = None;

            while let Some(ergebnis) = strom.naechster_frame().await {
                let frame = match ergebnis {
                    Ok(frame) => frame,
                    Err(fehler) => {
                        if abbruch.is_cancelled() {
                            return;
                        }
                        tracing::warn!(job = %id, fehler = %fehler, "Sprachsynthese fehlgeschlagen");
                        let _ = ereignisse.send(DialogEreignis::SyntheseFehler { job: id, fehler }).await;
                        return;
                    }
                };

                tokio::select! {
                    biased;
                    _ = abbruch.cancelled() => return,
                    _ = playout.auf_platz_warten(id) => {}
                }
                let seq = frame.sequence();
                if playout.einreihen(id, frame) == Einreihung::Abgewiesen {
                    // Puffer wurde fuer einen anderen Job geleert
                    return;
                }
                letzte_seq = Some(seq);
            }

            if abbruch.is_cancelled() {
                return;
            }
            job.segment_erfassen(text, letzte_seq);
        }

        playout.markieren(id);
        tokio::select! {
            biased;
            _ = abbruch.cancelled() => return,
            _ = playout.auf_leer_warten() => {}
        }
        if job.fertig_markieren() {
            tracing::debug!(job = %id, "Synthese-Job ausgespielt");
            let _ = ereignisse.send(DialogEreignis::SyntheseFertig { job: id }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::time::Duration;

    /// Liefert pro Text einen Block mit `samples_pro_text` Samples in Bloecken zu 100
    struct BlockTts {
        samples_pro_text: usize,
    }

    #[async_trait]
    impl TextToSpeech for BlockTts {
        async fn synthetisieren(
            &self,
            _text: &str,
            _stimme: &VoiceConfig,
        ) -> Result<PcmStream, SynthesisError> {
            let bloecke: Vec<Result<Vec<i16>, SynthesisError>> = (0..self.samples_pro_text)
                .collect::<Vec<_>>()
                .chunks(100)
                .map(|c| Ok(vec![1000i16; c.len()]))
                .collect();
            Ok(stream::iter(bloecke).boxed())
        }
    }

    struct DefektTts;

    #[async_trait]
    impl TextToSpeech for DefektTts {
        async fn synthetisieren(
            &self,
            _text: &str,
            _stimme: &VoiceConfig,
        ) -> Result<PcmStream, SynthesisError> {
            Err(SynthesisError::Anbieter {
                status: 500,
                nachricht: "kaputt".into(),
            })
        }
    }

    #[tokio::test]
    async fn neu_rahmen_und_auffuellen() {
        let adapter = SynthesisAdapter::neu(
            Arc::new(BlockTts {
                samples_pro_text: 450,
            }),
            VoiceConfig::default(),
        );
        let mut strom =
            adapter.stream_text("hallo", &VoiceConfig::default(), CancellationToken::new());

        let mut frames = Vec::new();
        while let Some(f) = strom.naechster_frame().await {
            frames.push(f.unwrap());
        }
        // 450 Samples -> 2 volle Frames + 1 aufgefuellter
        assert_eq!(frames.len(), 3);
        let seqs: Vec<u64> = frames.iter().map(|f| f.sequence()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(frames[2].samples()[129], 1000);
        assert_eq!(frames[2].samples()[130], 0);
    }

    #[tokio::test]
    async fn abbruch_stoppt_den_strom() {
        let adapter = SynthesisAdapter::neu(
            Arc::new(BlockTts {
                samples_pro_text: 1600,
            }),
            VoiceConfig::default(),
        );
        let abbruch = CancellationToken::new();
        let mut strom = adapter.stream_text("hallo", &VoiceConfig::default(), abbruch.clone());
        assert!(strom.naechster_frame().await.is_some());
        abbruch.cancel();
        assert!(strom.naechster_frame().await.is_none());
    }

    #[tokio::test]
    async fn job_abbrechen_ist_idempotent() {
        let (job, _rx) = SynthesisJob::neu(JobId(1));
        assert_eq!(job.zustand(), JobZustand::Pending);
        assert!(job.abbrechen());
        assert!(!job.abbrechen());
        assert_eq!(job.zustand(), JobZustand::Cancelled);
        assert!(!job.segment_senden("zu spaet"));
    }

    #[test]
    fn gesprochener_text_nur_ausgespielte_segmente() {
        let (job, _rx) = SynthesisJob::neu(JobId(1));
        job.segment_erfassen("Erster Satz.".into(), Some(4));
        job.segment_erfassen("Zweiter Satz.".into(), Some(9));

        assert_eq!(job.gesprochener_text(None), "");
        assert_eq!(job.gesprochener_text(Some(5)), "Erster Satz.");
        assert_eq!(job.gesprochener_text(Some(9)), "Erster Satz. Zweiter Satz.");
        assert_eq!(job.vollstaendiger_text(), "Erster Satz. Zweiter Satz.");
    }

    #[tokio::test(start_paused = true)]
    async fn job_reiht_ein_und_meldet_fertig() {
        let adapter = SynthesisAdapter::neu(
            Arc::new(BlockTts {
                samples_pro_text: 320,
            }),
            VoiceConfig::default(),
        );
        let playout = PlayoutBuffer::standard();
        let (tx, mut rx) = mpsc::channel(8);

        let job = adapter.job_starten(JobId(1), playout.clone(), tx);
        assert!(job.segment_senden("Erster Satz."));
        assert!(job.segment_senden("Zweiter Satz."));
        job.abschliessen();

        // Taktgeber simulieren
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            playout.naechster();
        }

        match rx.recv().await {
            Some(DialogEreignis::SyntheseFertig { job: id }) => assert_eq!(id, JobId(1)),
            andere => panic!("SyntheseFertig erwartet, erhalten: {andere:?}"),
        }
        assert_eq!(job.zustand(), JobZustand::Done);
        assert_eq!(playout.statistik().eingereiht, 4);
        assert_eq!(job.vollstaendiger_text(), "Erster Satz. Zweiter Satz.");
    }

    #[tokio::test]
    async fn job_meldet_synthesefehler() {
        let adapter = SynthesisAdapter::neu(Arc::new(DefektTts), VoiceConfig::default());
        let (tx, mut rx) = mpsc::channel(8);
        let job = adapter.job_starten(JobId(3), PlayoutBuffer::standard(), tx);
        job.segment_senden("Hallo.");
        job.abschliessen();

        match rx.recv().await {
            Some(DialogEreignis::SyntheseFehler { job: id, fehler }) => {
                assert_eq!(id, JobId(3));
                assert!(matches!(fehler, SynthesisError::Anbieter { status: 500, .. }));
            }
            andere => panic!("SyntheseFehler erwartet, erhalten: {andere:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abgebrochener_job_reiht_nichts_mehr_ein() {
        let adapter = SynthesisAdapter::neu(
            Arc::new(BlockTts {
                samples_pro_text: 16_000,
            }),
            VoiceConfig::default(),
        );
        let playout = PlayoutBuffer::neu(voxcall_voice::PlayoutConfig { max_frames: 4 });
        let (tx, mut rx) = mpsc::channel(8);
        let job = adapter.job_starten(JobId(1), playout.clone(), tx);
        job.segment_senden("Ein sehr langer Satz.");
        job.abschliessen();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(playout.fuellstand(), 4);

        job.abbrechen();
        playout.leeren();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(playout.fuellstand(), 0);
        assert_eq!(playout.statistik().eingereiht, 4);
        assert!(rx.try_recv().is_err());
    }
}

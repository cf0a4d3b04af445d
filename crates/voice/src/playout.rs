//! Ausgangspuffer fuer synthetisiertes Audio
//!
//! Begrenzte FIFO zwischen Synthese-Job (bursty) und Taktgeber
//! (isochron, 20 ms). Eigenschaften:
//! - `einreihen` blockiert nie. Bei Ueberlauf wird der aelteste noch nicht
//!   gesendete Frame verworfen.
//! - Nur Frames des aktiven Jobs werden angenommen; nach `leeren` werden
//!   Nachzuegler des abgebrochenen Jobs abgewiesen.
//! - Produzenten koennen in ihrem eigenen Task mit [`PlayoutBuffer::auf_platz_warten`]
//!   auf freie Kapazitaet warten. Die Session-Schleife selbst wartet nie.
//! - Eine Markierung haengt am letzten eingereihten Frame ihres Jobs und
//!   wird faellig, sobald dieser Frame an den Taktgeber abgegeben ist.
//!
//! Der Puffer wird zwischen Dialog, Synthese-Job und Taktgeber geteilt
//! (`Clone` teilt den Zustand).

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use voxcall_audio::{AudioFrame, FRAME_DAUER};
use voxcall_core::JobId;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Ausgangspuffers
#[derive(Debug, Clone)]
pub struct PlayoutConfig {
    /// Maximale Tiefe in Frames
    pub max_frames: usize,
}

impl PlayoutConfig {
    /// Erstellt eine Konfiguration aus einer Tiefe in Millisekunden
    pub fn aus_millisekunden(tiefe_ms: u32) -> Self {
        Self {
            max_frames: (tiefe_ms / FRAME_DAUER.as_millis() as u32).max(1) as usize,
        }
    }
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self::aus_millisekunden(250)
    }
}

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Ausgangspuffers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayoutStatistik {
    /// Angenommene Frames
    pub eingereiht: u64,
    /// An den Taktgeber abgegebene Frames
    pub gesendet: u64,
    /// Wegen Ueberlauf verworfene Frames
    pub ueberlauf: u64,
    /// Abgewiesene Frames inaktiver Jobs
    pub abgewiesen: u64,
    /// Durch `leeren` verworfene Frames
    pub geleert: u64,
    /// Anzahl `leeren`-Aufrufe
    pub flushes: u64,
}

/// Ergebnis von [`PlayoutBuffer::einreihen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Einreihung {
    Eingereiht,
    /// Eingereiht, dafuer wurde der aelteste Frame verworfen
    AeltesterVerworfen,
    /// Job ist nicht (mehr) aktiv
    Abgewiesen,
}

// ---------------------------------------------------------------------------
// PlayoutBuffer
// ---------------------------------------------------------------------------

/// Geteilter, begrenzter Ausgangspuffer einer Session
#[derive(Clone)]
pub struct PlayoutBuffer {
    inner: Arc<PlayoutInner>,
}

struct PlayoutInner {
    config: PlayoutConfig,
    zustand: Mutex<PlayoutZustand>,
    /// Wird geweckt, wenn Platz frei wird oder der Job wechselt
    platz_frei: Notify,
    /// Wird geweckt, wenn der Puffer leer gelaufen ist
    leer: Notify,
}

/// Ausstehende Markierung; `nach` ist die Sequenz des letzten Frames davor
struct Marke {
    job: JobId,
    nach: Option<u64>,
}

struct PlayoutZustand {
    frames: VecDeque<AudioFrame>,
    marken: VecDeque<Marke>,
    aktiver_job: Option<JobId>,
    clear_ausstehend: bool,
    /// Sequenznummer des zuletzt an den Taktgeber abgegebenen Frames
    zuletzt_gesendet: Option<u64>,
    statistik: PlayoutStatistik,
}

impl PlayoutBuffer {
    pub fn neu(config: PlayoutConfig) -> Self {
        Self {
            inner: Arc::new(PlayoutInner {
                config,
                zustand: Mutex::new(PlayoutZustand {
                    frames: VecDeque::new(),
                    marken: VecDeque::new(),
                    aktiver_job: None,
                    clear_ausstehend: false,
                    zuletzt_gesendet: None,
                    statistik: PlayoutStatistik::default(),
                }),
                platz_frei: Notify::new(),
                leer: Notify::new(),
            }),
        }
    }

    pub fn standard() -> Self {
        Self::neu(PlayoutConfig::default())
    }

    /// Macht `job` zum einzigen Job, dessen Frames angenommen werden
    pub fn job_aktivieren(&self, job: JobId) {
        self.inner.zustand.lock().aktiver_job = Some(job);
        tracing::trace!(job = %job, "Playout-Job aktiviert");
    }

    /// Reiht einen Frame ein, ohne je zu blockieren
    pub fn einreihen(&self, job: JobId, frame: AudioFrame) -> Einreihung {
        let mut z = self.inner.zustand.lock();
        if z.aktiver_job != Some(job) {
            z.statistik.abgewiesen += 1;
            return Einreihung::Abgewiesen;
        }

        z.frames.push_back(frame);
        z.statistik.eingereiht += 1;

        if z.frames.len() > self.inner.config.max_frames {
            if let Some(alt) = z.frames.pop_front() {
                z.statistik.ueberlauf += 1;
                tracing::warn!(
                    job = %job,
                    sequence = alt.sequence(),
                    "Playout-Ueberlauf: aeltester Frame verworfen"
                );
            }
            return Einreihung::AeltesterVerworfen;
        }
        Einreihung::Eingereiht
    }

    /// Verwirft alles Gepufferte und deaktiviert den laufenden Job
    ///
    /// Der Taktgeber sendet daraufhin einmalig ein Clear an den Anbieter.
    /// Gibt die Anzahl verworfener Frames zurueck.
    pub fn leeren(&self) -> usize {
        let verworfen = {
            let mut z = self.inner.zustand.lock();
            let n = z.frames.len();
            z.frames.clear();
            z.marken.clear();
            z.aktiver_job = None;
            z.clear_ausstehend = true;
            z.statistik.geleert += n as u64;
            z.statistik.flushes += 1;
            n
        };
        self.inner.platz_frei.notify_waiters();
        self.inner.leer.notify_waiters();
        tracing::debug!(verworfen, "Playout-Puffer geleert");
        verworfen
    }

    /// Nimmt den naechsten Frame fuer den Taktgeber
    pub fn naechster(&self) -> Option<AudioFrame> {
        let (frame, jetzt_leer) = {
            let mut z = self.inner.zustand.lock();
            let frame = z.frames.pop_front();
            if let Some(f) = &frame {
                z.statistik.gesendet += 1;
                z.zuletzt_gesendet = Some(f.sequence());
            }
            (frame, z.frames.is_empty())
        };
        if frame.is_some() {
            self.inner.platz_frei.notify_waiters();
        }
        if jetzt_leer {
            self.inner.leer.notify_waiters();
        }
        frame
    }

    /// Setzt eine Markierung hinter den zuletzt eingereihten Frame von `job`
    ///
    /// `false` wenn `job` nicht aktiv ist.
    pub fn markieren(&self, job: JobId) -> bool {
        let mut z = self.inner.zustand.lock();
        if z.aktiver_job != Some(job) {
            return false;
        }
        let nach = z.frames.back().map(|f| f.sequence());
        z.marken.push_back(Marke { job, nach });
        true
    }

    /// Naechste faellige Markierung fuer den Taktgeber
    pub fn marke_abholen(&self) -> Option<JobId> {
        let mut z = self.inner.zustand.lock();
        let faellig = match z.marken.front()?.nach {
            None => true,
            Some(nach) => z.zuletzt_gesendet.is_some_and(|gesendet| gesendet >= nach),
        };
        if !faellig {
            return None;
        }
        z.marken.pop_front().map(|m| m.job)
    }

    /// Liefert einmalig `true`, wenn seit dem letzten Aufruf geleert wurde
    pub fn clear_abholen(&self) -> bool {
        std::mem::take(&mut self.inner.zustand.lock().clear_ausstehend)
    }

    /// Wartet bis Platz fuer mindestens einen Frame ist oder `job` nicht mehr aktiv ist
    pub async fn auf_platz_warten(&self, job: JobId) {
        loop {
            let benachrichtigt = self.inner.platz_frei.notified();
            {
                let z = self.inner.zustand.lock();
                if z.aktiver_job != Some(job) || z.frames.len() < self.inner.config.max_frames {
                    return;
                }
            }
            benachrichtigt.await;
        }
    }

    /// Wartet bis alle Frames an den Taktgeber abgegeben wurden
    pub async fn auf_leer_warten(&self) {
        loop {
            let benachrichtigt = self.inner.leer.notified();
            if self.inner.zustand.lock().frames.is_empty() {
                return;
            }
            benachrichtigt.await;
        }
    }

    /// Sequenznummer des zuletzt gesendeten Frames
    pub fn zuletzt_gesendet(&self) -> Option<u64> {
        self.inner.zustand.lock().zuletzt_gesendet
    }

    pub fn fuellstand(&self) -> usize {
        self.inner.zustand.lock().frames.len()
    }

    pub fn kapazitaet(&self) -> usize {
        self.inner.config.max_frames
    }

    pub fn statistik(&self) -> PlayoutStatistik {
        self.inner.zustand.lock().statistik.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    fn make_frame(seq: u64) -> AudioFrame {
        AudioFrame::aufgefuellt(seq, &[500; 160], Instant::now())
    }

    #[test]
    fn nur_aktiver_job_wird_angenommen() {
        let puffer = PlayoutBuffer::standard();
        assert_eq!(puffer.einreihen(JobId(1), make_frame(1)), Einreihung::Abgewiesen);

        puffer.job_aktivieren(JobId(1));
        assert_eq!(puffer.einreihen(JobId(1), make_frame(1)), Einreihung::Eingereiht);
        assert_eq!(puffer.einreihen(JobId(2), make_frame(2)), Einreihung::Abgewiesen);
        assert_eq!(puffer.fuellstand(), 1);
        assert_eq!(puffer.statistik().abgewiesen, 2);
    }

    #[test]
    fn ueberlauf_verwirft_aeltesten() {
        let puffer = PlayoutBuffer::neu(PlayoutConfig { max_frames: 3 });
        puffer.job_aktivieren(JobId(1));
        for seq in 1..=3 {
            assert_eq!(puffer.einreihen(JobId(1), make_frame(seq)), Einreihung::Eingereiht);
        }
        assert_eq!(
            puffer.einreihen(JobId(1), make_frame(4)),
            Einreihung::AeltesterVerworfen
        );
        assert_eq!(puffer.naechster().map(|f| f.sequence()), Some(2));
        assert_eq!(puffer.statistik().ueberlauf, 1);
    }

    #[test]
    fn leeren_verwirft_und_meldet_clear_einmal() {
        let puffer = PlayoutBuffer::standard();
        puffer.job_aktivieren(JobId(1));
        for seq in 1..=5 {
            puffer.einreihen(JobId(1), make_frame(seq));
        }
        assert_eq!(puffer.leeren(), 5);
        assert_eq!(puffer.fuellstand(), 0);
        assert!(puffer.clear_abholen());
        assert!(!puffer.clear_abholen());

        // Nachzuegler des abgebrochenen Jobs
        assert_eq!(puffer.einreihen(JobId(1), make_frame(6)), Einreihung::Abgewiesen);
    }

    #[test]
    fn zuletzt_gesendet_folgt_dem_taktgeber() {
        let puffer = PlayoutBuffer::standard();
        puffer.job_aktivieren(JobId(1));
        puffer.einreihen(JobId(1), make_frame(10));
        puffer.einreihen(JobId(1), make_frame(11));
        assert_eq!(puffer.zuletzt_gesendet(), None);
        puffer.naechster();
        assert_eq!(puffer.zuletzt_gesendet(), Some(10));
    }

    #[test]
    fn markierung_folgt_dem_letzten_frame() {
        let puffer = PlayoutBuffer::standard();
        assert!(!puffer.markieren(JobId(1)));

        puffer.job_aktivieren(JobId(1));
        puffer.einreihen(JobId(1), make_frame(1));
        puffer.einreihen(JobId(1), make_frame(2));
        assert!(puffer.markieren(JobId(1)));
        assert_eq!(puffer.marke_abholen(), None);

        puffer.naechster();
        assert_eq!(puffer.marke_abholen(), None);
        puffer.naechster();
        assert_eq!(puffer.marke_abholen(), Some(JobId(1)));
        assert_eq!(puffer.marke_abholen(), None);
    }

    #[test]
    fn leeren_verwirft_markierungen() {
        let puffer = PlayoutBuffer::standard();
        puffer.job_aktivieren(JobId(1));
        puffer.einreihen(JobId(1), make_frame(1));
        puffer.markieren(JobId(1));
        puffer.leeren();

        puffer.job_aktivieren(JobId(2));
        puffer.einreihen(JobId(2), make_frame(2));
        puffer.naechster();
        assert_eq!(puffer.marke_abholen(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn warten_auf_platz_endet_nach_entnahme() {
        let puffer = PlayoutBuffer::neu(PlayoutConfig { max_frames: 2 });
        puffer.job_aktivieren(JobId(1));
        puffer.einreihen(JobId(1), make_frame(1));
        puffer.einreihen(JobId(1), make_frame(2));

        let p = puffer.clone();
        let wartend = tokio::spawn(async move { p.auf_platz_warten(JobId(1)).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!wartend.is_finished());

        puffer.naechster();
        tokio::time::timeout(Duration::from_millis(10), wartend)
            .await
            .expect("Warten muss nach Entnahme enden")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn warten_auf_platz_endet_nach_leeren() {
        let puffer = PlayoutBuffer::neu(PlayoutConfig { max_frames: 1 });
        puffer.job_aktivieren(JobId(1));
        puffer.einreihen(JobId(1), make_frame(1));

        let p = puffer.clone();
        let wartend = tokio::spawn(async move { p.auf_platz_warten(JobId(1)).await });
        tokio::task::yield_now().await;

        puffer.leeren();
        tokio::time::timeout(Duration::from_millis(10), wartend)
            .await
            .expect("Warten muss nach Leeren enden")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn warten_auf_leer() {
        let puffer = PlayoutBuffer::standard();
        puffer.job_aktivieren(JobId(1));
        puffer.einreihen(JobId(1), make_frame(1));

        let p = puffer.clone();
        let wartend = tokio::spawn(async move { p.auf_leer_warten().await });
        tokio::task::yield_now().await;
        assert!(!wartend.is_finished());

        puffer.naechster();
        tokio::time::timeout(Duration::from_millis(10), wartend)
            .await
            .expect("Warten muss enden, sobald der Puffer leer ist")
            .unwrap();
    }
}

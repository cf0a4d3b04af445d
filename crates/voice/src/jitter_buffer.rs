//! Eingangs-Jitter-Buffer fuer Telefonie-Frames
//!
//! Ordnet eingehende Frames nach Sequenznummer und gleicht Netzwerk-Jitter
//! innerhalb eines kleinen Reorder-Fensters aus (Standard: 3 Frames / 60 ms).
//! Ein Frame wird freigegeben, sobald
//! - er der naechste erwartete ist,
//! - mehr als `fenster_frames` Frames hinter einer Luecke warten, oder
//! - er laenger als die Fensterdauer im Buffer liegt.
//!
//! Damit kommen Frames immer streng aufsteigend heraus. Frames, die erst
//! nach ihrer Luecke eintreffen, werden verworfen und zaehlen als Verlust.
//! Der Buffer blockiert nie.
//!
//! ## Performance-Eigenschaften
//! - O(log n) Einfuegen (BTreeMap nach Sequenz sortiert)
//! - O(log n) Entnahme des aeltesten Frames
//! - Keine Locks (wird pro Session single-threaded verwendet)

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use voxcall_audio::{AudioFrame, FRAME_DAUER};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer den Jitter Buffer
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Reorder-Fenster in Frames
    pub fenster_frames: usize,
    /// Maximale Puffertiefe in Frames
    pub max_frames: usize,
}

impl JitterBufferConfig {
    /// Wartezeit, nach der ein Frame trotz Luecke freigegeben wird
    pub fn fenster_dauer(&self) -> Duration {
        FRAME_DAUER * self.fenster_frames as u32
    }

    /// Erstellt eine Konfiguration aus Millisekunden-Angaben
    pub fn aus_millisekunden(fenster_ms: u32, tiefe_ms: u32) -> Self {
        let frame_ms = FRAME_DAUER.as_millis() as u32;
        Self {
            fenster_frames: (fenster_ms / frame_ms).max(1) as usize,
            max_frames: (tiefe_ms / frame_ms).max(1) as usize,
        }
    }
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        // 60 ms Fenster, 250 ms Tiefe
        Self::aus_millisekunden(60, 250)
    }
}

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Jitter Buffers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStatistik {
    /// Anzahl empfangener Frames gesamt
    pub empfangen: u64,
    /// Anzahl freigegebener Frames
    pub freigegeben: u64,
    /// Anzahl verworfener Duplikate (im Buffer)
    pub duplikate: u64,
    /// Frames, die erst nach ihrer Freigabeposition eintrafen
    pub verspaetet: u64,
    /// Sequenznummern, die nie freigegeben wurden
    pub verloren: u64,
    /// Wegen Ueberlauf verworfene Frames
    pub ueberlauf: u64,
    /// Frames, die vor einer kleineren Sequenznummer eintrafen
    pub out_of_order: u64,
    /// Aktueller Fuellstand in Frames
    pub fuellstand: usize,
}

// ---------------------------------------------------------------------------
// InboundJitterBuffer
// ---------------------------------------------------------------------------

/// Jitter Buffer fuer die Eingangsrichtung einer Session
pub struct InboundJitterBuffer {
    config: JitterBufferConfig,
    /// Gepufferte Frames, sortiert nach Sequenznummer
    frames: BTreeMap<u64, AudioFrame>,
    /// Naechste erwartete Sequenznummer (None vor der ersten Freigabe)
    naechste_seq: Option<u64>,
    statistik: JitterBufferStatistik,
}

impl InboundJitterBuffer {
    /// Erstellt einen neuen Jitter Buffer mit gegebener Konfiguration
    pub fn neu(config: JitterBufferConfig) -> Self {
        Self {
            config,
            frames: BTreeMap::new(),
            naechste_seq: None,
            statistik: JitterBufferStatistik::default(),
        }
    }

    /// Erstellt einen Buffer mit Standardkonfiguration
    pub fn standard() -> Self {
        Self::neu(JitterBufferConfig::default())
    }

    /// Fuegt einen Frame ein; gibt `false` zurueck wenn er verworfen wurde
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        let seq = frame.sequence();
        self.statistik.empfangen += 1;

        // Zu spaet: die Position wurde bereits freigegeben
        if let Some(naechste) = self.naechste_seq {
            if seq < naechste {
                self.statistik.verspaetet += 1;
                tracing::trace!(sequence = seq, erwartet = naechste, "Verspaeteter Frame verworfen");
                return false;
            }
        }

        if self.frames.contains_key(&seq) {
            self.statistik.duplikate += 1;
            tracing::trace!(sequence = seq, "Duplikat verworfen");
            return false;
        }

        if let Some((&hoechste, _)) = self.frames.last_key_value() {
            if seq < hoechste {
                self.statistik.out_of_order += 1;
                tracing::debug!(sequence = seq, hoechste, "Out-of-Order Frame");
            }
        }

        self.frames.insert(seq, frame);

        // Ueberlauf: aeltesten Frame verwerfen, Freigabeposition dahinter setzen
        if self.frames.len() > self.config.max_frames {
            if let Some((aelteste, _)) = self.frames.pop_first() {
                self.luecke_zaehlen(aelteste);
                self.statistik.verloren += 1;
                self.statistik.ueberlauf += 1;
                self.naechste_seq = Some(aelteste + 1);
                tracing::warn!(sequence = aelteste, "Buffer-Ueberlauf: Frame verworfen");
            }
        }

        self.statistik.fuellstand = self.frames.len();
        true
    }

    /// Gibt den naechsten Frame zurueck, falls er freigegeben werden darf
    pub fn pop(&mut self, jetzt: Instant) -> Option<AudioFrame> {
        let (&seq, frame) = self.frames.first_key_value()?;

        let ist_erwartet = self.naechste_seq == Some(seq);
        let fenster_voll = self.frames.len() > self.config.fenster_frames;
        let zu_alt = jetzt.saturating_duration_since(frame.ankunft()) >= self.config.fenster_dauer();
        if !(ist_erwartet || fenster_voll || zu_alt) {
            return None;
        }

        let frame = self.frames.remove(&seq)?;
        self.luecke_zaehlen(seq);
        self.naechste_seq = Some(seq + 1);
        self.statistik.freigegeben += 1;
        self.statistik.fuellstand = self.frames.len();
        Some(frame)
    }

    /// Gibt alle Frames frei, die zum Zeitpunkt `jetzt` freigegeben werden duerfen
    pub fn freigeben(&mut self, jetzt: Instant) -> Vec<AudioFrame> {
        let mut aus = Vec::new();
        while let Some(frame) = self.pop(jetzt) {
            aus.push(frame);
        }
        aus
    }

    /// Zeitpunkt, zu dem der aelteste wartende Frame spaetestens freigegeben wird
    pub fn naechste_frist(&self) -> Option<Instant> {
        self.frames
            .first_key_value()
            .map(|(_, f)| f.ankunft() + self.config.fenster_dauer())
    }

    /// Gibt eine Referenz auf die aktuellen Statistiken
    pub fn statistik(&self) -> &JitterBufferStatistik {
        &self.statistik
    }

    /// Gibt den aktuellen Fuellstand zurueck
    pub fn fuellstand(&self) -> usize {
        self.frames.len()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    /// Zaehlt uebersprungene Sequenznummern vor `seq` als Verlust
    fn luecke_zaehlen(&mut self, seq: u64) {
        if let Some(erwartet) = self.naechste_seq {
            if seq > erwartet {
                let verlust = seq - erwartet;
                self.statistik.verloren += verlust;
                tracing::debug!(erwartet, erhalten = seq, verlust, "Frame-Luecke erkannt");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

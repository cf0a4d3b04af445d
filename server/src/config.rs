//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Zugangsdaten fehlen in der Datei meist; sie werden aus
//! der Umgebung ergaenzt (`.env` wird vorher von `main` geladen).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use voxcall_audio::{VadConfig, FRAME_DAUER};
use voxcall_dialog::providers::{DeepgramConfig, ElevenLabsConfig, GeminiConfig};
use voxcall_dialog::{DialogConfig, VoiceConfig};
use voxcall_session::SessionConfig;
use voxcall_voice::{JitterBufferConfig, PlayoutConfig};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Puffer der Audio-Pipeline
    pub audio: AudioEinstellungen,
    /// Sprach-Endpunkterkennung
    pub vad: VadEinstellungen,
    /// Gespraechsfuehrung
    pub dialog: DialogEinstellungen,
    /// Telefonie-Anbieter (ausgehende Anrufe)
    pub telefonie: TelefonieEinstellungen,
    /// Sprach-Anbieter (STT, TTS, LLM)
    pub anbieter: AnbieterEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Oeffentlich erreichbare Basis-URL (fuer TwiML und ausgehende Anrufe)
    pub oeffentliche_url: Option<String>,
    /// Maximale Anzahl gleichzeitiger Anrufe (0 = unbegrenzt)
    pub max_anrufe: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "voxcall".into(),
            oeffentliche_url: None,
            max_anrufe: 0,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket
    pub port: u16,
    /// Erlaubte CORS-Origins. Leer = alle Origins erlaubt (nur fuer Entwicklung).
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

/// Puffer der Audio-Pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Reorder-Fenster des Eingangs-Jitter-Buffers in ms
    pub jitter_fenster_ms: u32,
    /// Maximale Tiefe des Eingangs-Jitter-Buffers in ms
    pub jitter_tiefe_ms: u32,
    /// Maximale Tiefe des Ausgangspuffers in ms
    pub playout_tiefe_ms: u32,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            jitter_fenster_ms: 60,
            jitter_tiefe_ms: 250,
            playout_tiefe_ms: 250,
        }
    }
}

/// Sprach-Endpunkterkennung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadEinstellungen {
    /// Energie-Schwellenwert (normalisierte RMS, 0.0..1.0)
    pub energie_schwelle: f32,
    /// Laute Frames in Folge bis zum Sprachbeginn
    pub onset_frames: u32,
    /// Stille bis zum Ende einer Aeusserung in ms
    pub hangover_ms: u32,
    /// Tolerierte Stille-Frames im Onset, solange der Agent spricht
    pub barge_in_max_stille_frames: u32,
    /// Maximale Laenge einer Aeusserung in ms
    pub max_aeusserung_ms: u32,
}

impl Default for VadEinstellungen {
    fn default() -> Self {
        Self {
            energie_schwelle: 0.02,
            onset_frames: 3,
            hangover_ms: 500,
            barge_in_max_stille_frames: 5,
            max_aeusserung_ms: 30_000,
        }
    }
}

/// Gespraechsfuehrung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogEinstellungen {
    /// Maximale Denkzeit bis zur Entschuldigung in Sekunden
    pub denkzeit_limit_s: u64,
    /// Stille bis zum Auflegen in Sekunden
    pub leerlauf_timeout_s: u64,
    /// Wartezeit auf die `start`-Nachricht in Sekunden
    pub start_timeout_s: u64,
    /// Eroeffnungssatz (leer = keiner)
    pub begruessung: String,
    /// Rueckfrage nach gescheiterter Transkription
    pub rueckfrage: String,
    /// Entschuldigung nach gescheiterter Antwort
    pub entschuldigung: String,
    /// Faehigkeits-Fehler in Folge bis zum Abbruch
    pub max_fehler_in_folge: u32,
    /// Obergrenze des Gespraechsverlaufs
    pub max_turns: usize,
}

impl Default for DialogEinstellungen {
    fn default() -> Self {
        let dialog = DialogConfig::default();
        Self {
            denkzeit_limit_s: dialog.denkzeit_limit.as_secs(),
            leerlauf_timeout_s: dialog.leerlauf_timeout.as_secs(),
            start_timeout_s: 10,
            begruessung: dialog.begruessung.unwrap_or_default(),
            rueckfrage: dialog.rueckfrage,
            entschuldigung: dialog.entschuldigung,
            max_fehler_in_folge: dialog.max_fehler_in_folge,
            max_turns: dialog.max_turns,
        }
    }
}

/// Telefonie-Anbieter (REST-API fuer ausgehende Anrufe)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelefonieEinstellungen {
    pub api_basis: String,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Absendernummer im E.164-Format
    pub telefonnummer: Option<String>,
}

impl Default for TelefonieEinstellungen {
    fn default() -> Self {
        Self {
            api_basis: "https://api.twilio.com".into(),
            account_sid: None,
            auth_token: None,
            telefonnummer: None,
        }
    }
}

/// Sprach-Anbieter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnbieterEinstellungen {
    pub deepgram_api_key: Option<String>,
    pub deepgram_modell: String,
    pub sprache: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_modell: Option<String>,
    pub google_api_key: Option<String>,
    pub gemini_modell: String,
    /// Systemanweisung fuer das Sprachmodell (None = eingebaute)
    pub system_anweisung: Option<String>,
}

impl Default for AnbieterEinstellungen {
    fn default() -> Self {
        let stimme = VoiceConfig::default();
        Self {
            deepgram_api_key: None,
            deepgram_modell: "nova-2-phonecall".into(),
            sprache: "en-US".into(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: stimme.stimme_id,
            elevenlabs_modell: stimme.modell,
            google_api_key: None,
            gemini_modell: "gemini-2.5-pro".into(),
            system_anweisung: None,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Haengt `/metrics` und `/health` an den Hauptserver
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

// ---------------------------------------------------------------------------
// Laden und Ableiten
// ---------------------------------------------------------------------------

/// Quelle fuer Umgebungsvariablen (in Tests ersetzbar)
pub trait Umgebung {
    fn lesen(&self, name: &str) -> Option<String>;
}

/// Prozess-Umgebung
pub struct ProzessUmgebung;

impl Umgebung for ProzessUmgebung {
    fn lesen(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|w| !w.trim().is_empty())
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.umgebung_anwenden(&ProzessUmgebung);
        config.validieren()?;
        Ok(config)
    }

    /// Ergaenzt fehlende Zugangsdaten aus der Umgebung
    ///
    /// Werte aus der Datei haben Vorrang.
    pub fn umgebung_anwenden(&mut self, env: &dyn Umgebung) {
        fn ergaenzen(ziel: &mut Option<String>, env: &dyn Umgebung, name: &str) {
            if ziel.is_none() {
                *ziel = env.lesen(name);
            }
        }
        let a = &mut self.anbieter;
        ergaenzen(&mut a.google_api_key, env, "GOOGLE_API_KEY");
        ergaenzen(&mut a.elevenlabs_api_key, env, "ELEVENLABS_API_KEY");
        ergaenzen(&mut a.deepgram_api_key, env, "DEEPGRAM_API_KEY");
        if let Some(stimme) = env.lesen("ELEVENLABS_VOICE_ID") {
            a.elevenlabs_voice_id = stimme;
        }

        let t = &mut self.telefonie;
        ergaenzen(&mut t.account_sid, env, "TWILIO_ACCOUNT_SID");
        ergaenzen(&mut t.auth_token, env, "TWILIO_AUTH_TOKEN");
        ergaenzen(&mut t.telefonnummer, env, "TWILIO_PHONE_NUMBER");

        ergaenzen(&mut self.server.oeffentliche_url, env, "VOXCALL_PUBLIC_URL");
    }

    /// Prueft Wertebereiche, die spaeter nicht mehr sinnvoll abfangbar sind
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !(0.0..1.0).contains(&self.vad.energie_schwelle) {
            anyhow::bail!(
                "vad.energie_schwelle muss in [0, 1) liegen, ist {}",
                self.vad.energie_schwelle
            );
        }
        if self.vad.onset_frames == 0 {
            anyhow::bail!("vad.onset_frames muss mindestens 1 sein");
        }
        if self.dialog.denkzeit_limit_s == 0 || self.dialog.leerlauf_timeout_s == 0 {
            anyhow::bail!("dialog.denkzeit_limit_s und dialog.leerlauf_timeout_s muessen > 0 sein");
        }
        if self.audio.jitter_tiefe_ms < self.audio.jitter_fenster_ms {
            anyhow::bail!("audio.jitter_tiefe_ms darf nicht kleiner als das Reorder-Fenster sein");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    pub fn vad_config(&self) -> VadConfig {
        let frame_ms = FRAME_DAUER.as_millis() as u32;
        VadConfig {
            energie_schwelle: self.vad.energie_schwelle,
            onset_frames: self.vad.onset_frames,
            hangover_frames: (self.vad.hangover_ms / frame_ms).max(1),
            barge_in_max_stille_frames: self.vad.barge_in_max_stille_frames,
            max_utterance_frames: (self.vad.max_aeusserung_ms / frame_ms).max(1) as usize,
        }
    }

    pub fn dialog_config(&self) -> DialogConfig {
        let d = &self.dialog;
        DialogConfig {
            denkzeit_limit: Duration::from_secs(d.denkzeit_limit_s),
            leerlauf_timeout: Duration::from_secs(d.leerlauf_timeout_s),
            begruessung: Some(d.begruessung.clone()).filter(|b| !b.trim().is_empty()),
            rueckfrage: d.rueckfrage.clone(),
            entschuldigung: d.entschuldigung.clone(),
            max_fehler_in_folge: d.max_fehler_in_folge,
            max_turns: d.max_turns,
            ..DialogConfig::default()
        }
    }

    pub fn stimme(&self) -> VoiceConfig {
        VoiceConfig {
            stimme_id: self.anbieter.elevenlabs_voice_id.clone(),
            modell: self.anbieter.elevenlabs_modell.clone(),
        }
    }

    /// Konfiguration einer Call-Session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            jitter: JitterBufferConfig::aus_millisekunden(
                self.audio.jitter_fenster_ms,
                self.audio.jitter_tiefe_ms,
            ),
            vad: self.vad_config(),
            playout: PlayoutConfig::aus_millisekunden(self.audio.playout_tiefe_ms),
            dialog: self.dialog_config(),
            stimme: self.stimme(),
            start_timeout: Duration::from_secs(self.dialog.start_timeout_s),
            ..SessionConfig::default()
        }
    }

    /// Anbieter-Konfigurationen, falls alle drei Schluessel vorhanden sind
    pub fn anbieter_configs(&self) -> Option<(DeepgramConfig, ElevenLabsConfig, GeminiConfig)> {
        let a = &self.anbieter;
        let deepgram = a.deepgram_api_key.as_ref().map(|key| {
            let mut c = DeepgramConfig::neu(key.clone());
            c.modell = a.deepgram_modell.clone();
            c.sprache = a.sprache.clone();
            c
        })?;
        let elevenlabs = a.elevenlabs_api_key.as_ref().map(ElevenLabsConfig::neu)?;
        let gemini = a.google_api_key.as_ref().map(|key| {
            let mut c = GeminiConfig::neu(key.clone());
            c.modell = a.gemini_modell.clone();
            if a.system_anweisung.is_some() {
                c.system_anweisung = a.system_anweisung.clone();
            }
            c
        })?;
        Some((deepgram, elevenlabs, gemini))
    }

    /// Fehlende Anbieter-Schluessel (fuer Startmeldungen)
    pub fn fehlende_schluessel(&self) -> Vec<&'static str> {
        let a = &self.anbieter;
        [
            ("DEEPGRAM_API_KEY", a.deepgram_api_key.is_none()),
            ("ELEVENLABS_API_KEY", a.elevenlabs_api_key.is_none()),
            ("GOOGLE_API_KEY", a.google_api_key.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, fehlt)| fehlt.then_some(name))
        .collect()
    }
}

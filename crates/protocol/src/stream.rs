//! Media-Stream-Nachrichten (WebSocket, JSON)
//!
//! Der Telefonie-Anbieter sendet pro Verbindung eine Folge von
//! JSON-Textnachrichten, unterschieden ueber das Feld `event`:
//!
//! ```text
//! connected -> start -> media* (mark*) -> stop
//! ```
//!
//! Audio liegt als Base64-kodiertes 8 kHz mu-law im Feld `media.payload`.
//! In Gegenrichtung sendet der Server `media`, `mark` und `clear`.
//! Unbekannte Ereignisse werden als [`EingehendeNachricht::Unbekannt`]
//! geparst und vom Aufrufer ignoriert.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ProtokollFehler, ProtokollResult};

/// Erwartete Kodierung im `start.mediaFormat`
pub const ERWARTETES_ENCODING: &str = "audio/x-mulaw";

/// Erwartete Abtastrate im `start.mediaFormat`
pub const ERWARTETE_ABTASTRATE: u32 = 8000;

// ---------------------------------------------------------------------------
// Eingehende Nachrichten
// ---------------------------------------------------------------------------

/// Nachricht vom Telefonie-Anbieter an den Server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum EingehendeNachricht {
    /// Erste Nachricht nach dem Verbindungsaufbau
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    /// Stream-Metadaten, genau einmal vor dem ersten `media`
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartDaten,
    },
    /// Ein Audio-Chunk
    Media {
        #[serde(rename = "sequenceNumber", default)]
        sequence_number: Option<String>,
        media: MediaDaten,
    },
    /// Bestaetigung einer zuvor gesendeten Markierung
    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        mark: MarkDaten,
    },
    /// Ende des Streams (Anruf aufgelegt)
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    /// Alles andere (z.B. `dtmf`)
    #[serde(other)]
    Unbekannt,
}

impl EingehendeNachricht {
    /// Parst eine Textnachricht des Media-Streams
    pub fn parsen(text: &str) -> ProtokollResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Inhalt der `start`-Nachricht
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDaten {
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    pub media_format: MediaFormat,
}

impl StartDaten {
    /// Prueft ob das angekuendigte Audioformat 8 kHz mu-law ist
    pub fn format_pruefen(&self) -> ProtokollResult<()> {
        let f = &self.media_format;
        if f.encoding != ERWARTETES_ENCODING || f.sample_rate != ERWARTETE_ABTASTRATE {
            return Err(ProtokollFehler::Audioformat {
                encoding: f.encoding.clone(),
                abtastrate: f.sample_rate,
            });
        }
        Ok(())
    }
}

/// Audioformat des Streams
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(default = "ein_kanal")]
    pub channels: u8,
}

fn ein_kanal() -> u8 {
    1
}

/// Inhalt einer eingehenden `media`-Nachricht
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaDaten {
    #[serde(default)]
    pub track: Option<String>,
    /// Laufende Chunk-Nummer (als String, beginnend bei "1")
    #[serde(default)]
    pub chunk: Option<String>,
    /// Millisekunden seit Stream-Beginn (als String)
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64-kodiertes mu-law
    pub payload: String,
}

impl MediaDaten {
    /// Dekodiert die Base64-Nutzdaten in mu-law-Bytes
    pub fn payload_dekodieren(&self) -> ProtokollResult<Vec<u8>> {
        Ok(STANDARD.decode(self.payload.as_bytes())?)
    }

    /// Chunk-Nummer als Zahl, falls vorhanden und gueltig
    pub fn chunk_nummer(&self) -> Option<u64> {
        self.chunk.as_deref().and_then(|c| c.parse().ok())
    }
}

/// Benannte Markierung im Audio-Stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDaten {
    pub name: String,
}

/// Ermittelt die Sequenznummer eines Audio-Chunks
///
/// Bevorzugt `media.chunk` (zaehlt nur Audio), sonst die
/// nachrichtenweite `sequenceNumber`.
pub fn sequenz_aus_media(sequence_number: Option<&str>, media: &MediaDaten) -> Option<u64> {
    media
        .chunk_nummer()
        .or_else(|| sequence_number.and_then(|s| s.parse().ok()))
}

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// Nachricht vom Server an den Telefonie-Anbieter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum AusgehendeNachricht {
    /// Audio zur Wiedergabe beim Anrufer
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: AusgehendeMedia,
    },
    /// Markierung, die nach Wiedergabe aller vorherigen Audiodaten bestaetigt wird
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkDaten,
    },
    /// Verwirft beim Anbieter gepuffertes, noch nicht abgespieltes Audio
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Nutzdaten einer ausgehenden `media`-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AusgehendeMedia {
    pub payload: String,
}

impl AusgehendeNachricht {
    /// Erstellt eine `media`-Nachricht aus mu-law-Bytes
    pub fn media(stream_sid: &str, mulaw: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: AusgehendeMedia {
                payload: STANDARD.encode(mulaw),
            },
        }
    }

    /// Erstellt eine `mark`-Nachricht
    pub fn mark(stream_sid: &str, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkDaten { name: name.into() },
        }
    }

    /// Erstellt eine `clear`-Nachricht
    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    /// Serialisiert die Nachricht als JSON-Text
    pub fn serialisieren(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = r#"{
        "event": "start",
        "sequenceNumber": "1",
        "start": {
            "accountSid": "AC123",
            "streamSid": "MZ42",
            "callSid": "CA99",
            "tracks": ["inbound"],
            "customParameters": {"kampagne": "test"},
            "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
        },
        "streamSid": "MZ42"
    }"#;

    #[test]
    fn start_nachricht_parsen() {
        let nachricht = EingehendeNachricht::parsen(START).unwrap();
        match nachricht {
            EingehendeNachricht::Start { stream_sid, start } => {
                assert_eq!(stream_sid, "MZ42");
                assert_eq!(start.call_sid.as_deref(), Some("CA99"));
                assert_eq!(start.custom_parameters["kampagne"], "test");
                assert!(start.format_pruefen().is_ok());
            }
            andere => panic!("Start erwartet, erhalten: {andere:?}"),
        }
    }

    #[test]
    fn falsches_format_wird_erkannt() {
        let json = START.replace("8000", "16000");
        let EingehendeNachricht::Start { start, .. } = EingehendeNachricht::parsen(&json).unwrap()
        else {
            panic!("Start erwartet");
        };
        assert!(matches!(
            start.format_pruefen(),
            Err(ProtokollFehler::Audioformat { abtastrate: 16000, .. })
        ));
    }

    #[test]
    fn media_nachricht_parsen_und_dekodieren() {
        let json = r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"2","timestamp":"20","payload":"/38A"},"streamSid":"MZ42"}"#;
        let EingehendeNachricht::Media {
            sequence_number,
            media,
        } = EingehendeNachricht::parsen(json).unwrap()
        else {
            panic!("Media erwartet");
        };
        assert_eq!(media.payload_dekodieren().unwrap(), vec![0xFF, 0x7F, 0x00]);
        assert_eq!(sequenz_aus_media(sequence_number.as_deref(), &media), Some(2));
    }

    #[test]
    fn sequenz_faellt_auf_sequence_number_zurueck() {
        let media = MediaDaten {
            track: None,
            chunk: None,
            timestamp: None,
            payload: String::new(),
        };
        assert_eq!(sequenz_aus_media(Some("17"), &media), Some(17));
        assert_eq!(sequenz_aus_media(None, &media), None);
    }

    #[test]
    fn unbekanntes_ereignis_wird_ignoriert() {
        let json = r#"{"event":"dtmf","dtmf":{"digit":"5"},"streamSid":"MZ42"}"#;
        assert_eq!(
            EingehendeNachricht::parsen(json).unwrap(),
            EingehendeNachricht::Unbekannt
        );
    }

    #[test]
    fn stop_und_mark_parsen() {
        let stop = EingehendeNachricht::parsen(r#"{"event":"stop","streamSid":"MZ42","stop":{}}"#)
            .unwrap();
        assert!(matches!(stop, EingehendeNachricht::Stop { .. }));

        let mark =
            EingehendeNachricht::parsen(r#"{"event":"mark","mark":{"name":"job:1"}}"#).unwrap();
        assert_eq!(
            mark,
            EingehendeNachricht::Mark {
                stream_sid: None,
                mark: MarkDaten {
                    name: "job:1".into()
                }
            }
        );
    }

    #[test]
    fn kaputtes_json_ist_fehler() {
        assert!(matches!(
            EingehendeNachricht::parsen("{\"event\":"),
            Err(ProtokollFehler::Json(_))
        ));
    }

    #[test]
    fn ausgehende_nachrichten_serialisieren() {
        let media = AusgehendeNachricht::media("MZ42", &[0xFF, 0x7F, 0x00])
            .serialisieren()
            .unwrap();
        assert_eq!(
            media,
            r#"{"event":"media","streamSid":"MZ42","media":{"payload":"/38A"}}"#
        );

        let clear = AusgehendeNachricht::clear("MZ42").serialisieren().unwrap();
        assert_eq!(clear, r#"{"event":"clear","streamSid":"MZ42"}"#);

        let mark = AusgehendeNachricht::mark("MZ42", "job:4")
            .serialisieren()
            .unwrap();
        assert!(mark.contains(r#""mark":{"name":"job:4"}"#));
    }
}

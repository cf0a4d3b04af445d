//! Gemini – Antwortgenerierung per `streamGenerateContent`
//!
//! Die Antwort kommt als Server-Sent-Events (`alt=sse`). Jedes Ereignis
//! enthaelt ein JSON-Objekt mit den naechsten Text-Teilen des Kandidaten.
//! Der Verlauf wird auf Gemini-Rollen abgebildet (`user` / `model`);
//! aufeinanderfolgende Runden derselben Rolle werden zusammengefasst.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use super::fehlertext_kuerzen;
use crate::capability::{Reasoner, TextDeltaStream};
use crate::error::ReasoningError;
use crate::history::{Rolle, Turn};

/// Eroeffnet das Gespraech, wenn der Verlauf mit einer Agent-Runde beginnt
const EROEFFNUNG: &str = "Let's have a brief conversation. Introduce yourself as a helpful AI assistant and ask me how you can help.";

/// Zugangsdaten und Modell fuer Gemini
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub basis_url: String,
    pub modell: String,
    pub system_anweisung: Option<String>,
    pub verbindungs_zeitlimit: Duration,
}

impl GeminiConfig {
    pub fn neu(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            basis_url: "https://generativelanguage.googleapis.com".to_string(),
            modell: "gemini-2.5-pro".to_string(),
            system_anweisung: Some(
                "You are a helpful AI assistant on a phone call. Answer in one to three short, \
                 spoken sentences without markdown or lists."
                    .to_string(),
            ),
            verbindungs_zeitlimit: Duration::from_secs(5),
        }
    }
}

pub struct GeminiReasoner {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiReasoner {
    pub fn neu(config: GeminiConfig) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.verbindungs_zeitlimit)
            .build()
            .map_err(|e| ReasoningError::Verbindung(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.basis_url.trim_end_matches('/'),
            self.config.modell,
        )
    }
}

#[async_trait]
impl Reasoner for GeminiReasoner {
    async fn antworten(&self, verlauf: &[Turn]) -> Result<TextDeltaStream, ReasoningError> {
        let anfrage = anfrage_bauen(verlauf, self.config.system_anweisung.as_deref());
        tracing::debug!(
            modell = %self.config.modell,
            runden = verlauf.len(),
            "Gemini-Anfrage"
        );

        let antwort = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&anfrage)
            .send()
            .await?;

        let status = antwort.status();
        if !status.is_success() {
            let nachricht = antwort.text().await.unwrap_or_default();
            return Err(ReasoningError::Anbieter {
                status: status.as_u16(),
                nachricht: fehlertext_kuerzen(nachricht),
            });
        }

        Ok(delta_strom(antwort.bytes_stream()))
    }
}

// ---------------------------------------------------------------------------
// Anfrage
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAnfrage {
    contents: Vec<Inhalt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Inhalt>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Inhalt {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Teil>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Teil {
    text: String,
}

fn rolle_name(rolle: Rolle) -> &'static str {
    match rolle {
        Rolle::Benutzer => "user",
        Rolle::Agent => "model",
    }
}

fn anfrage_bauen(verlauf: &[Turn], system: Option<&str>) -> GenerateAnfrage {
    let mut contents: Vec<Inhalt> = Vec::with_capacity(verlauf.len() + 1);

    if verlauf.first().is_some_and(|t| t.rolle == Rolle::Agent) {
        contents.push(Inhalt {
            role: Some("user"),
            parts: vec![Teil {
                text: EROEFFNUNG.to_string(),
            }],
        });
    }

    for turn in verlauf {
        let rolle = rolle_name(turn.rolle);
        match contents.last_mut() {
            Some(letzter) if letzter.role == Some(rolle) => letzter.parts.push(Teil {
                text: turn.text.clone(),
            }),
            _ => contents.push(Inhalt {
                role: Some(rolle),
                parts: vec![Teil {
                    text: turn.text.clone(),
                }],
            }),
        }
    }

    GenerateAnfrage {
        contents,
        system_instruction: system.map(|text| Inhalt {
            role: None,
            parts: vec![Teil {
                text: text.to_string(),
            }],
        }),
    }
}

// ---------------------------------------------------------------------------
// Server-Sent-Events
// ---------------------------------------------------------------------------

/// Zerlegt einen Byte-Strom in die `data:`-Nutzlasten vollstaendiger Zeilen
#[derive(Debug, Default)]
struct SseZerleger {
    puffer: Vec<u8>,
}

impl SseZerleger {
    fn push(&mut self, block: &[u8]) -> Vec<String> {
        self.puffer.extend_from_slice(block);
        let mut daten = Vec::new();
        while let Some(pos) = self.puffer.iter().position(|&b| b == b'\n') {
            let zeile: Vec<u8> = self.puffer.drain(..=pos).collect();
            if let Some(d) = Self::daten(&zeile) {
                daten.push(d);
            }
        }
        daten
    }

    /// Restliche Zeile ohne abschliessenden Umbruch
    fn abschliessen(&mut self) -> Option<String> {
        let zeile = std::mem::take(&mut self.puffer);
        Self::daten(&zeile)
    }

    fn daten(zeile: &[u8]) -> Option<String> {
        let zeile = String::from_utf8_lossy(zeile);
        let zeile = zeile.trim_end_matches(['\r', '\n']);
        let nutzlast = zeile.strip_prefix("data:")?.trim_start();
        (!nutzlast.is_empty() && nutzlast != "[DONE]").then(|| nutzlast.to_string())
    }
}

/// Text eines SSE-Ereignisses; `Ok(None)` wenn es keinen Text enthaelt
fn delta_aus_ereignis(daten: &str) -> Result<Option<String>, ReasoningError> {
    let wert: serde_json::Value = serde_json::from_str(daten)
        .map_err(|e| ReasoningError::UngueltigeAntwort(e.to_string()))?;

    if let Some(fehler) = wert.get("error") {
        return Err(ReasoningError::Anbieter {
            status: fehler["code"].as_u64().unwrap_or(500) as u16,
            nachricht: fehler["message"].as_str().unwrap_or_default().to_string(),
        });
    }

    let text: String = wert["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|teile| {
            teile
                .iter()
                .filter(|t| !t["thought"].as_bool().unwrap_or(false))
                .filter_map(|t| t["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

struct StromZustand {
    bytes: stream::BoxStream<'static, reqwest::Result<Bytes>>,
    zerleger: SseZerleger,
    anstehend: VecDeque<Result<String, ReasoningError>>,
    ende: bool,
}

impl StromZustand {
    fn daten_verarbeiten(&mut self, daten: Vec<String>) {
        for d in daten {
            match delta_aus_ereignis(&d) {
                Ok(Some(text)) => self.anstehend.push_back(Ok(text)),
                Ok(None) => {}
                Err(e) => {
                    self.anstehend.push_back(Err(e));
                    self.ende = true;
                    return;
                }
            }
        }
    }
}

fn delta_strom(
    bytes: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> TextDeltaStream {
    let start = StromZustand {
        bytes: bytes.boxed(),
        zerleger: SseZerleger::default(),
        anstehend: VecDeque::new(),
        ende: false,
    };

    stream::unfold(start, |mut z| async move {
        loop {
            if let Some(delta) = z.anstehend.pop_front() {
                return Some((delta, z));
            }
            if z.ende {
                return None;
            }
            match z.bytes.next().await {
                Some(Ok(block)) => {
                    let daten = z.zerleger.push(&block);
                    z.daten_verarbeiten(daten);
                }
                Some(Err(e)) => {
                    z.anstehend.push_back(Err(ReasoningError::from(e)));
                    z.ende = true;
                }
                None => {
                    let rest = z.zerleger.abschliessen();
                    z.daten_verarbeiten(rest.into_iter().collect());
                    z.ende = true;
                }
            }
        }
    })
    .boxed()
}

//! Deepgram – Transkription abgeschlossener Aeusserungen
//!
//! Die Aeusserung wird als rohes mu-law (8 kHz, mono) an `/v1/listen`
//! geschickt. Deepgram antwortet mit genau einem Ergebnis, das als
//! finales Transkript weitergegeben wird.

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use voxcall_audio::{Utterance, ABTASTRATE_HZ};

use super::fehlertext_kuerzen;
use crate::capability::{SpeechToText, TranskriptTeil, TranskriptTeilStream};
use crate::error::TranscriptionError;

/// Zugangsdaten und Modell fuer Deepgram
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    pub basis_url: String,
    pub modell: String,
    pub sprache: String,
    pub zeitlimit: Duration,
}

impl DeepgramConfig {
    pub fn neu(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            basis_url: "https://api.deepgram.com".to_string(),
            modell: "nova-2-phonecall".to_string(),
            sprache: "en-US".to_string(),
            zeitlimit: Duration::from_secs(10),
        }
    }
}

pub struct DeepgramStt {
    client: reqwest::Client,
    config: DeepgramConfig,
}

impl DeepgramStt {
    pub fn neu(config: DeepgramConfig) -> Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(config.zeitlimit)
            .build()
            .map_err(|e| TranscriptionError::Verbindung(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/listen?encoding=mulaw&sample_rate={}&channels=1&model={}&language={}&punctuate=true",
            self.config.basis_url.trim_end_matches('/'),
            ABTASTRATE_HZ,
            self.config.modell,
            self.config.sprache,
        )
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transkribieren(
        &self,
        utterance: &Utterance,
    ) -> Result<TranskriptTeilStream, TranscriptionError> {
        let audio = utterance.mulaw();
        tracing::debug!(
            utterance = %utterance.id(),
            bytes = audio.len(),
            "Deepgram-Anfrage"
        );

        let antwort = self
            .client
            .post(self.url())
            .header(AUTHORIZATION, format!("Token {}", self.config.api_key))
            .header(CONTENT_TYPE, "audio/mulaw")
            .body(audio)
            .send()
            .await?;

        let status = antwort.status();
        let text = antwort.text().await?;
        if !status.is_success() {
            return Err(TranscriptionError::Anbieter {
                status: status.as_u16(),
                nachricht: fehlertext_kuerzen(text),
            });
        }

        let teil = antwort_auswerten(&text)?;
        Ok(stream::iter(vec![Ok(teil)]).boxed())
    }
}

// ---------------------------------------------------------------------------
// Antwortformat
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListenAntwort {
    results: ListenErgebnisse,
}

#[derive(Debug, Deserialize)]
struct ListenErgebnisse {
    channels: Vec<ListenKanal>,
}

#[derive(Debug, Deserialize)]
struct ListenKanal {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Liest das beste Transkript des ersten Kanals
fn antwort_auswerten(body: &str) -> Result<TranskriptTeil, TranscriptionError> {
    let antwort: ListenAntwort = serde_json::from_str(body)
        .map_err(|e| TranscriptionError::UngueltigeAntwort(e.to_string()))?;

    let beste = antwort
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|k| k.alternatives.into_iter().next());

    Ok(match beste {
        Some(alt) => TranskriptTeil::final_(alt.transcript.trim(), alt.confidence),
        // Keine Alternative = keine erkannte Sprache
        None => TranskriptTeil::final_("", 0.0),
    })
}

//! ElevenLabs – Streaming-Sprachsynthese
//!
//! Fordert direkt das Telefonie-Format an (`ulaw_8000`), damit weder
//! Resampling noch Transkodierung noetig ist. Die Antwort wird als
//! Byte-Stream gelesen und blockweise nach PCM dekodiert.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;
use voxcall_audio::codec::mulaw_zu_pcm;

use super::fehlertext_kuerzen;
use crate::capability::{PcmStream, TextToSpeech, VoiceConfig};
use crate::error::SynthesisError;

/// Zugangsdaten fuer ElevenLabs
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub basis_url: String,
    pub verbindungs_zeitlimit: Duration,
}

impl ElevenLabsConfig {
    pub fn neu(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            basis_url: "https://api.elevenlabs.io".to_string(),
            verbindungs_zeitlimit: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct SyntheseAnfrage<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
}

pub struct ElevenLabsTts {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsTts {
    pub fn neu(config: ElevenLabsConfig) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.verbindungs_zeitlimit)
            .build()
            .map_err(|e| SynthesisError::Verbindung(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, stimme: &VoiceConfig) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream?output_format=ulaw_8000",
            self.config.basis_url.trim_end_matches('/'),
            stimme.stimme_id,
        )
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthetisieren(
        &self,
        text: &str,
        stimme: &VoiceConfig,
    ) -> Result<PcmStream, SynthesisError> {
        tracing::debug!(stimme = %stimme.stimme_id, zeichen = text.len(), "ElevenLabs-Anfrage");

        let anfrage = SyntheseAnfrage {
            text,
            model_id: stimme.modell.as_deref(),
        };
        let antwort = self
            .client
            .post(self.url(stimme))
            .header("xi-api-key", &self.config.api_key)
            .json(&anfrage)
            .send()
            .await?;

        let status = antwort.status();
        if !status.is_success() {
            let nachricht = antwort.text().await.unwrap_or_default();
            return Err(SynthesisError::Anbieter {
                status: status.as_u16(),
                nachricht: fehlertext_kuerzen(nachricht),
            });
        }

        let strom = antwort.bytes_stream().map(|block| match block {
            Ok(bytes) => Ok(mulaw_zu_pcm(&bytes)),
            Err(e) => Err(SynthesisError::from(e)),
        });
        Ok(strom.boxed())
    }
}

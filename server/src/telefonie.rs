//! Ausgehende Anrufe ueber die REST-API des Telefonie-Anbieters
//!
//! Der Anbieter ruft nach dem Verbindungsaufbau `POST /twilio/call` auf
//! und erhaelt dort das TwiML, das den Media-Stream auf `/ws/call` lenkt.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use voxcall_protocol::twiml;

use crate::config::{ServerConfig, TelefonieEinstellungen};

#[derive(Debug, Error)]
pub enum TelefonieFehler {
    #[error("Telefonie nicht konfiguriert: {0} fehlt")]
    NichtKonfiguriert(&'static str),

    #[error("Ungueltige Zielnummer: {0}")]
    UngueltigeNummer(String),

    #[error("HTTP-Fehler: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Anbieter lehnt ab (HTTP {status}): {nachricht}")]
    Abgelehnt { status: u16, nachricht: String },
}

/// Ergebnis eines angelegten Anrufs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnrufAngelegt {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FehlerAntwort {
    #[serde(default)]
    message: Option<String>,
}

/// Client fuer die Calls-Ressource
#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    api_basis: String,
    account_sid: String,
    auth_token: String,
    absender: String,
    /// Oeffentliche Basis-URL dieses Servers
    rueckruf_basis: String,
}

impl TwilioClient {
    pub fn neu(
        einstellungen: &TelefonieEinstellungen,
        rueckruf_basis: impl Into<String>,
    ) -> Result<Self, TelefonieFehler> {
        let account_sid = einstellungen
            .account_sid
            .clone()
            .ok_or(TelefonieFehler::NichtKonfiguriert("TWILIO_ACCOUNT_SID"))?;
        let auth_token = einstellungen
            .auth_token
            .clone()
            .ok_or(TelefonieFehler::NichtKonfiguriert("TWILIO_AUTH_TOKEN"))?;
        let absender = einstellungen
            .telefonnummer
            .clone()
            .ok_or(TelefonieFehler::NichtKonfiguriert("TWILIO_PHONE_NUMBER"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            api_basis: einstellungen.api_basis.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            absender,
            rueckruf_basis: rueckruf_basis.into(),
        })
    }

    /// Baut den Client aus der Server-Konfiguration
    pub fn aus_config(config: &ServerConfig) -> Result<Self, TelefonieFehler> {
        let basis = config
            .server
            .oeffentliche_url
            .clone()
            .ok_or(TelefonieFehler::NichtKonfiguriert("VOXCALL_PUBLIC_URL"))?;
        Self::neu(&config.telefonie, basis)
    }

    /// URL, die der Anbieter beim Verbindungsaufbau abruft
    pub fn rueckruf_url(&self) -> String {
        format!(
            "{}{}",
            self.rueckruf_basis.trim_end_matches('/'),
            twiml::ANRUF_PFAD
        )
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_basis, self.account_sid
        )
    }

    /// Legt einen ausgehenden Anruf an
    pub async fn anrufen(&self, ziel: &str) -> Result<AnrufAngelegt, TelefonieFehler> {
        nummer_pruefen(ziel)?;

        let rueckruf = self.rueckruf_url();
        let antwort = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", ziel),
                ("From", self.absender.as_str()),
                ("Url", rueckruf.as_str()),
            ])
            .send()
            .await?;

        let status = antwort.status();
        if !status.is_success() {
            let nachricht = antwort
                .json::<FehlerAntwort>()
                .await
                .ok()
                .and_then(|f| f.message)
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(status = status.as_u16(), nachricht = %nachricht, "Anruf abgelehnt");
            return Err(TelefonieFehler::Abgelehnt {
                status: status.as_u16(),
                nachricht,
            });
        }

        let angelegt = antwort.json::<AnrufAngelegt>().await?;
        tracing::info!(call_sid = %angelegt.sid, ziel = ziel, "Ausgehender Anruf angelegt");
        Ok(angelegt)
    }
}

/// E.164: `+` gefolgt von 8 bis 15 Ziffern
pub fn nummer_pruefen(nummer: &str) -> Result<(), TelefonieFehler> {
    let ziffern = nummer.strip_prefix('+').unwrap_or("");
    let gueltig = (8..=15).contains(&ziffern.len()) && ziffern.chars().all(|c| c.is_ascii_digit());
    if gueltig {
        Ok(())
    } else {
        Err(TelefonieFehler::UngueltigeNummer(nummer.to_string()))
    }
}

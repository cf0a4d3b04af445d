//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Konfigurationsdatei):
//! - `VX_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `voxcall_session=debug`)
//! - `VX_LOG_FORMAT`: Format (`text`/`json`), Standard: text
//!
//! Jede Call-Session laeuft in einem `call`-Span; im JSON-Format erscheint
//! die Call-ID dadurch an jedem Log-Event.

use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const LEVEL_ENV: &str = "VX_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const FORMAT_ENV: &str = "VX_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anders => Err(format!("Unbekanntes Log-Format: {anders}")),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `level` und `format` kommen aus der Konfiguration und werden von
/// `VX_LOG_LEVEL` / `VX_LOG_FORMAT` ueberschrieben. Ungueltige Werte fallen
/// auf `info` / `text` zurueck. Gibt `false` zurueck, wenn bereits ein
/// globaler Subscriber gesetzt war.
pub fn logging_initialisieren(level: &str, format: &str) -> bool {
    let filter = EnvFilter::try_from_env(LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(FORMAT_ENV).ok().as_deref(), format);

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.is_ok()
}

/// Waehlt das Format: Umgebung vor Konfiguration, Fallback Text
fn format_waehlen(aus_env: Option<&str>, aus_config: &str) -> LogFormat {
    aus_env
        .and_then(|f| f.parse().ok())
        .or_else(|| aus_config.parse().ok())
        .unwrap_or_default()
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_parsen() {
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().is_err());
        assert!("JSON".parse::<LogFormat>().is_err());
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(format_waehlen(Some("json"), "text"), LogFormat::Json);
        assert_eq!(format_waehlen(None, "json"), LogFormat::Json);
    }

    #[test]
    fn ungueltige_werte_fallen_auf_text_zurueck() {
        assert_eq!(format_waehlen(Some("xml"), "yaml"), LogFormat::Text);
        assert_eq!(format_waehlen(Some("xml"), "json"), LogFormat::Json);
    }

    #[test]
    fn zweite_initialisierung_schlaegt_fehl() {
        let erste = logging_initialisieren("warn", "text");
        assert!(!logging_initialisieren("warn", "text"));
        // Beim ersten Aufruf im Prozess muss es geklappt haben
        let _ = erste;
    }
}

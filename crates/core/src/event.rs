//! Lebenszyklus-Ereignisse einer Call-Session
//!
//! Der Schliessgrund wird vom Dialog-Zustandsautomaten und vom Orchestrator
//! gemeinsam genutzt und beim Abbau einer Session protokolliert.

use serde::{Deserialize, Serialize};

/// Ursache fuer das Beenden einer Call-Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchliessGrund {
    /// Telefonie-Anbieter hat `stop` gesendet
    StreamGestoppt,
    /// Eingehender Stream ist ohne `stop` zu Ende gegangen
    StreamGeschlossen,
    /// Lesen oder Schreiben auf dem Socket ist fehlgeschlagen
    SocketGetrennt,
    /// Keine Sprache innerhalb des Leerlauf-Timeouts
    Leerlauf,
    /// Nicht behebbarer Fehler einer Komponente
    Fatal(String),
    /// Server wird heruntergefahren
    Shutdown,
}

impl std::fmt::Display for SchliessGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamGestoppt => write!(f, "stream_gestoppt"),
            Self::StreamGeschlossen => write!(f, "stream_geschlossen"),
            Self::SocketGetrennt => write!(f, "socket_getrennt"),
            Self::Leerlauf => write!(f, "leerlauf"),
            Self::Fatal(grund) => write!(f, "fatal: {grund}"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

//! voxcall Server – Einstiegspunkt
//!
//! Laedt `.env` und die Konfiguration, initialisiert das Logging und
//! startet den Server.

use anyhow::Result;
use voxcall_observability::logging_initialisieren;
use voxcall_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Zugangsdaten aus .env (optional)
    let env_datei = dotenvy::dotenv().ok();

    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("VOXCALL_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        env_datei = ?env_datei,
        "voxcall Server wird initialisiert"
    );

    Server::neu(config).starten().await
}

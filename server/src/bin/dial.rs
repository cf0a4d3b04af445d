//! voxcall-dial – legt einen ausgehenden Anruf an
//!
//! Aufruf: `voxcall-dial +4915112345678`
//!
//! Der angerufene Teilnehmer wird nach dem Abheben mit dem laufenden
//! Server verbunden (`VOXCALL_PUBLIC_URL` muss auf ihn zeigen).

use anyhow::{Context, Result};
use voxcall_observability::logging_initialisieren;
use voxcall_server::{config::ServerConfig, telefonie::TwilioClient};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let ziel = std::env::args()
        .nth(1)
        .context("Zielnummer fehlt (Aufruf: voxcall-dial +4915112345678)")?;

    let config_pfad = std::env::var("VOXCALL_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = ServerConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging.level, &config.logging.format);

    let client = TwilioClient::aus_config(&config)?;
    let angelegt = client.anrufen(&ziel).await?;

    println!("Anruf angelegt: {}", angelegt.sid);
    Ok(())
}

//! voxcall-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod handlers;
pub mod routes;
pub mod stream;
pub mod telefonie;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use voxcall_dialog::providers::{DeepgramStt, ElevenLabsTts, GeminiReasoner};
use voxcall_dialog::Capabilities;
use voxcall_observability::{observability_router, timing_middleware, HealthState, VoxcallMetrics};
use voxcall_session::SessionRegistry;

use config::ServerConfig;
use telefonie::TwilioClient;

/// Gemeinsamer Zustand aller HTTP- und WebSocket-Handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: SessionRegistry,
    pub metriken: VoxcallMetrics,
    pub health: HealthState,
    /// `None` solange Anbieter-Schluessel fehlen; neue Anrufe werden dann abgewiesen
    pub faehigkeiten: Option<Capabilities>,
    pub twilio: Option<TwilioClient>,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl AppState {
    pub fn neu(
        config: ServerConfig,
        faehigkeiten: Option<Capabilities>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let metriken = VoxcallMetrics::neu()?;
        let health = HealthState::neu(metriken.active_calls.clone());
        health.anbieter_bereit_setzen(faehigkeiten.is_some());

        let twilio = match TwilioClient::aus_config(&config) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::info!(grund = %e, "Ausgehende Anrufe deaktiviert");
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            registry: SessionRegistry::neu(),
            metriken,
            health,
            faehigkeiten,
            twilio,
            shutdown_rx,
        })
    }
}

/// Baut die Anbieter-Clients; `None` wenn Schluessel fehlen
pub fn faehigkeiten_aufbauen(config: &ServerConfig) -> Result<Option<Capabilities>> {
    let Some((deepgram, elevenlabs, gemini)) = config.anbieter_configs() else {
        tracing::warn!(
            fehlend = ?config.fehlende_schluessel(),
            "Anbieter-Schluessel fehlen, Anrufe werden abgewiesen"
        );
        return Ok(None);
    };
    Ok(Some(Capabilities::neu(
        Arc::new(DeepgramStt::neu(deepgram)?),
        Arc::new(ElevenLabsTts::neu(elevenlabs)?),
        Arc::new(GeminiReasoner::neu(gemini)?),
    )))
}

/// Vollstaendige Anwendung inklusive Middleware
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.netzwerk.cors_origins);
    let mut app = routes::router().with_state(state.clone());
    if state.config.observability.aktiviert {
        app = app.merge(observability_router(
            state.metriken.clone(),
            state.health.clone(),
        ));
    }
    app.layer(axum::middleware::from_fn_with_state(
        state.metriken.clone(),
        timing_middleware,
    ))
    .layer(voxcall_observability::request_timing_layer())
    .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet HTTP und Media-Stream und laeuft bis zum Shutdown-Signal
    ///
    /// Bei Ctrl-C meldet der Health-Check `unhealthy`, laufende Sessions
    /// erhalten das Shutdown-Signal und bauen sich geordnet ab.
    pub async fn starten(self) -> Result<()> {
        let bind = self.config.bind_adresse();
        let faehigkeiten = faehigkeiten_aufbauen(&self.config)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState::neu(self.config, faehigkeiten, shutdown_rx)?;

        tracing::info!(
            server_name = %state.config.server.name,
            adresse = %bind,
            oeffentliche_url = ?state.config.server.oeffentliche_url,
            anbieter_bereit = state.faehigkeiten.is_some(),
            "Server startet"
        );

        let health = state.health.clone();
        let registry = state.registry.clone();
        let listener = tokio::net::TcpListener::bind(bind.as_str()).await?;
        tracing::info!(adresse = %bind, "HTTP/WebSocket bereit");

        axum::serve(listener, app(state))
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(fehler = %e, "Signal-Handler fehlgeschlagen");
                }
                tracing::info!(
                    aktive_anrufe = registry.anzahl(),
                    "Shutdown-Signal empfangen, Server wird beendet"
                );
                health.herunterfahren();
                let _ = shutdown_tx.send(true);
            })
            .await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

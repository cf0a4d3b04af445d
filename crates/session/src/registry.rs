//! Session-Registry – In-Memory Verzeichnis aller laufenden Anrufe
//!
//! Thread-safe durch DashMap. Jede Session traegt sich beim
//! Verbindungsaufbau ein und beim Abbau wieder aus; die Registry haelt nur
//! beschreibende Daten, nie Komponenten einer Session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use voxcall_core::CallId;
use voxcall_dialog::DialogZustand;

// ---------------------------------------------------------------------------
// SessionInfo
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Call-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionZustand {
    /// WebSocket offen, `start` steht noch aus
    Connecting,
    /// Pipeline laeuft
    Active,
    /// Abbau laeuft
    Closing,
    /// Abgebaut
    Closed,
}

/// Beschreibung einer laufenden Session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub call_id: CallId,
    pub zustand: SessionZustand,
    /// Zustand des Dialogs (nur in `Active`)
    pub dialog: Option<String>,
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub verbunden_seit: DateTime<Utc>,
}

impl SessionInfo {
    pub fn neu(call_id: CallId) -> Self {
        Self {
            call_id,
            zustand: SessionZustand::Connecting,
            dialog: None,
            stream_sid: None,
            call_sid: None,
            verbunden_seit: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Verzeichnis aller Sessions eines Servers
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

#[derive(Default)]
struct SessionRegistryInner {
    sessions: DashMap<CallId, SessionInfo>,
}

impl SessionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Traegt eine Session ein; `false` wenn die Call-ID schon vergeben ist
    pub fn registrieren(&self, info: SessionInfo) -> bool {
        let call_id = info.call_id;
        match self.inner.sessions.entry(call_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::warn!(call_id = %call_id, "Session bereits registriert");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(platz) => {
                platz.insert(info);
                tracing::debug!(call_id = %call_id, "Session registriert");
                true
            }
        }
    }

    /// Entfernt eine Session
    pub fn entfernen(&self, call_id: &CallId) -> Option<SessionInfo> {
        let entfernt = self.inner.sessions.remove(call_id).map(|(_, info)| info);
        if entfernt.is_some() {
            tracing::debug!(call_id = %call_id, "Session entfernt");
        }
        entfernt
    }

    /// Aendert den Eintrag einer Session; `false` wenn sie nicht existiert
    pub fn aktualisieren<F>(&self, call_id: &CallId, f: F) -> bool
    where
        F: FnOnce(&mut SessionInfo),
    {
        match self.inner.sessions.get_mut(call_id) {
            Some(mut eintrag) => {
                f(&mut eintrag);
                true
            }
            None => false,
        }
    }

    pub fn zustand_setzen(&self, call_id: &CallId, zustand: SessionZustand) -> bool {
        self.aktualisieren(call_id, |info| info.zustand = zustand)
    }

    pub fn dialog_setzen(&self, call_id: &CallId, dialog: DialogZustand) -> bool {
        self.aktualisieren(call_id, |info| info.dialog = Some(dialog.to_string()))
    }

    pub fn info(&self, call_id: &CallId) -> Option<SessionInfo> {
        self.inner.sessions.get(call_id).map(|e| e.clone())
    }

    pub fn ist_registriert(&self, call_id: &CallId) -> bool {
        self.inner.sessions.contains_key(call_id)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Momentaufnahme aller Sessions, aelteste zuerst
    pub fn alle(&self) -> Vec<SessionInfo> {
        let mut alle: Vec<SessionInfo> =
            self.inner.sessions.iter().map(|e| e.value().clone()).collect();
        alle.sort_by_key(|info| info.verbunden_seit);
        alle
    }
}

//! Gespraechsverlauf einer Session
//!
//! Geordnete Liste abgeschlossener Runden. Nur die Zustandsmaschine
//! schreibt; Reasoning-Aufrufe erhalten einen Snapshot. Der Verlauf ist
//! begrenzt: bei Ueberschreitung von `max_turns` fallen die aeltesten
//! Runden heraus.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Sprecher einer Runde
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rolle {
    Benutzer,
    Agent,
}

/// Eine abgeschlossene Runde
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub rolle: Rolle,
    pub text: String,
    pub zeitpunkt: DateTime<Utc>,
}

impl Turn {
    pub fn neu(rolle: Rolle, text: impl Into<String>) -> Self {
        Self {
            rolle,
            text: text.into(),
            zeitpunkt: Utc::now(),
        }
    }
}

/// Append-only Verlauf mit Obergrenze
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
    verdraengt: u64,
}

impl ConversationHistory {
    pub fn neu(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
            verdraengt: 0,
        }
    }

    /// Haengt eine Runde an und verdraengt bei Bedarf die aelteste
    pub fn anhaengen(&mut self, rolle: Rolle, text: impl Into<String>) {
        self.turns.push_back(Turn::neu(rolle, text));
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
            self.verdraengt += 1;
        }
    }

    /// Kopie aller Runden in Reihenfolge
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn letzter(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Anzahl wegen der Obergrenze verdraengter Runden
    pub fn verdraengt(&self) -> u64 {
        self.verdraengt
    }
}

//! voxcall-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen voxcall-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SessionFatalError, VoxcallError};
pub use event::SchliessGrund;
pub use types::{CallId, JobId, UtteranceId};

//! voxcall-session – Call-Session-Orchestrator
//!
//! Eine [`CallSession`] verbindet einen Media-Stream (WebSocket) mit der
//! Sprach-Pipeline:
//!
//! ```text
//! media -> Codec -> Jitter-Buffer -> VAD -> Dialog -> Synthese -> Playout -> Pacer -> media
//! ```
//!
//! Die [`SessionRegistry`] ist die einzige Struktur, die sich Sessions teilen.

pub mod orchestrator;
pub mod registry;

pub use orchestrator::{CallSession, SessionBericht, SessionConfig};
pub use registry::{SessionInfo, SessionRegistry, SessionZustand};

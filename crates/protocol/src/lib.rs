//! voxcall-protocol – Telefonie-Protokoll-Definitionen
//!
//! Dieses Crate definiert die JSON-Nachrichten des Media-Streams, die
//! zwischen Telefonie-Anbieter und Server ueber den WebSocket laufen,
//! sowie die TwiML-Antwort, die einen Anruf auf den Stream umleitet.

pub mod error;
pub mod stream;
pub mod twiml;

pub use error::{ProtokollFehler, ProtokollResult};
pub use stream::{AusgehendeNachricht, EingehendeNachricht, MediaDaten, StartDaten};

//! voxcall-voice – Puffer zwischen Netz und Sprach-Pipeline
//!
//! ## Module
//! - [`jitter_buffer`] – Eingangs-Jitter-Buffer mit Reorder-Fenster
//! - [`playout`] – Begrenzter Ausgangspuffer fuer synthetisiertes Audio
//! - [`pacer`] – Taktgeber, der alle 20 ms genau einen Frame freigibt

pub mod jitter_buffer;
pub mod pacer;
pub mod playout;

pub use jitter_buffer::{InboundJitterBuffer, JitterBufferConfig, JitterBufferStatistik};
pub use pacer::{Pacer, PacerAusgabe};
pub use playout::{Einreihung, PlayoutBuffer, PlayoutConfig, PlayoutStatistik};

//! plausch-protocol – Signal-Protokoll und Wire-Format
//!
//! Definiert alle Signal-Nachrichten die zwischen Client und Server
//! ausgetauscht werden, sowie das frame-basierte Wire-Format fuer die
//! persistente TCP-Verbindung.
//!
//! ## Design
//! - Geschlossene tagged Enums statt string-basiertem Event-Dispatch:
//!   jede Nachricht ist eine Variante, der Handler-Match ist exhaustiv
//! - JSON-Serialisierung via serde (Signaling ist nicht zeitkritisch)
//! - Payload-Formen entsprechen den Browser-Typen (RTCSessionDescriptionInit,
//!   RTCIceCandidateInit), damit Clients sie unveraendert durchreichen koennen

pub mod signal;
pub mod wire;

// Bequeme Re-Exporte
pub use signal::{
    CallType, ClientSignal, IceCandidateInit, IceTransportState, ServerSignal, SessionDescription,
};
pub use wire::{ClientCodec, ServerCodec, SignalCodec};

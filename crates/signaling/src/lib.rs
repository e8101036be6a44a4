//! plausch-signaling – WebRTC Call-Signaling Layer
//!
//! Dieser Crate implementiert den Signaling-Service fuer Plausch. Er
//! verwaltet TCP-Verbindungen, das Benutzerverzeichnis und die
//! Anruf-Sessions zwischen jeweils zwei Peers; die eigentlichen Medien
//! laufen per WebRTC direkt zwischen den Browsern.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! SignalRouter
//!     |
//!     +-- UserDirectory    (Anzeigename <-> Verbindung)
//!     +-- SessionRegistry  (Anruf-Sessions, Timer)
//!           |
//!           +-- CallSession (Zustandsmaschine pro Anruf-Paar)
//!
//! SignalBroadcaster – Signale an die Clients senden
//! ```
//!
//! ## Session-Lebenslauf
//!
//! ```text
//! Bereit -> Anbieten -> Klingeln -> Beantwortet -> Verbinden -> Aktiv
//!                                                     ^           |
//!                                                     +-- ICE-Ausfall
//!
//! terminale Phasen: Beendet, Fehlgeschlagen
//! ```

pub mod broadcast;
pub mod connection;
pub mod directory;
pub mod error;
pub mod registry;
pub mod router;
pub mod server_state;
pub mod session;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::SignalBroadcaster;
pub use connection::ClientConnection;
pub use directory::UserDirectory;
pub use error::{SignalFehler, SignalResult};
pub use registry::SessionRegistry;
pub use router::SignalRouter;
pub use server_state::{SignalingConfig, SignalingState};
pub use session::{AnrufPhase, AnrufRegeln, AnrufRolle, CallSession};
pub use tcp::SignalingServer;

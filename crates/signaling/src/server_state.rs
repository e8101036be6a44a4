//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Manager als Arc-Referenzen, die sicher zwischen
//! tokio-Tasks geteilt werden koennen.

use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::SignalBroadcaster;
use crate::directory::UserDirectory;
use crate::registry::SessionRegistry;
use crate::session::AnrufRegeln;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale Clients
    pub max_clients: u32,
    /// Zeit- und Wiederholungsregeln fuer Anrufe
    pub anruf: AnrufRegeln,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Plausch Server".to_string(),
            max_clients: 512,
            anruf: AnrufRegeln::default(),
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
///
/// Alle Manager sind intern Arc-geteilt. Clone gibt eine Referenz auf
/// denselben inneren Zustand.
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Benutzerverzeichnis (Anzeigename <-> Verbindung)
    pub directory: UserDirectory,
    /// Signal-Versand an die Clients
    pub broadcaster: SignalBroadcaster,
    /// Anruf-Sessions
    pub registry: SessionRegistry,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig) -> Arc<Self> {
        let broadcaster = SignalBroadcaster::neu();
        let registry = SessionRegistry::neu(broadcaster.clone(), config.anruf);
        Arc::new(Self {
            config: Arc::new(config),
            directory: UserDirectory::neu(),
            broadcaster,
            registry,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

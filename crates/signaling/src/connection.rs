//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Die Verbindung erhaelt beim Aufbau eine frische
//! [`ConnectionId`] und wird sofort im Broadcaster registriert; eine
//! Authentifizierung gibt es nicht, der Anzeigename kommt per
//! `setUsername`.
//!
//! Beim Verbindungsende (Client-Disconnect, Lesefehler oder Shutdown)
//! raeumt der Router auf: laufende Session beenden, Verzeichnis- und
//! Broadcaster-Eintrag entfernen.

use futures_util::{SinkExt, StreamExt};
use plausch_core::types::ConnectionId;
use plausch_protocol::wire::ServerCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::router::SignalRouter;
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via [`ServerCodec`], routet sie an den [`SignalRouter`]
/// und sendet Signale aus der Broadcaster-Queue zurueck. Laeuft in einem
/// eigenen tokio-Task.
pub struct ClientConnection {
    state: Arc<SignalingState>,
    verbindung: ConnectionId,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer ConnectionId
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            verbindung: ConnectionId::new(),
            peer_addr,
        }
    }

    /// Gibt die ConnectionId dieser Verbindung zurueck
    pub fn verbindung(&self) -> ConnectionId {
        self.verbindung
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Diese Methode laeuft bis die Verbindung getrennt wird oder ein
    /// Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let verbindung = self.verbindung;

        tracing::info!(peer = %peer_addr, verbindung = %verbindung, "Neue Verbindung");

        let mut framed = Framed::new(stream, ServerCodec::default());

        // Broadcaster-Queue dieser Verbindung (Registry/Router -> TCP)
        let mut sende_rx = self.state.broadcaster.client_registrieren(verbindung);

        let router = SignalRouter::neu(Arc::clone(&self.state));

        loop {
            tokio::select! {
                // Eingehendes Signal vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(signal)) => {
                            tracing::trace!(
                                peer = %peer_addr,
                                verbindung = %verbindung,
                                "Signal empfangen"
                            );
                            router.dispatch(verbindung, signal).await;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler = %e,
                                "Frame-Lesefehler"
                            );
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehendes Signal aus der Broadcaster-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(
                            peer = %peer_addr,
                            fehler = %e,
                            "Senden fehlgeschlagen"
                        );
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende
        router.verbindung_getrennt(verbindung).await;

        tracing::info!(peer = %peer_addr, verbindung = %verbindung, "Verbindungs-Task beendet");
    }
}

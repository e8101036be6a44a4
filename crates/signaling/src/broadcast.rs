//! Signal-Versand – Sendet ServerSignale an verbundene Clients
//!
//! Der SignalBroadcaster verwaltet die Send-Queues aller verbundenen Clients
//! und stellt Methoden bereit, um Signale gezielt oder an alle zu senden.
//!
//! Senden ist best-effort: ist die Queue voll oder der Client getrennt,
//! wird das Signal verworfen und nur geloggt.

use dashmap::DashMap;
use plausch_core::types::ConnectionId;
use plausch_protocol::signal::ServerSignal;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Client
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub verbindung: ConnectionId,
    pub tx: mpsc::Sender<ServerSignal>,
}

impl ClientSender {
    /// Sendet ein Signal nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, signal: ServerSignal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = %self.verbindung, "Send-Queue voll – Signal verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.verbindung, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SignalBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Signal-Versand fuer alle verbundenen Clients
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SignalBroadcaster {
    inner: Arc<SignalBroadcasterInner>,
}

struct SignalBroadcasterInner {
    /// Client-Sender, indiziert nach ConnectionId
    clients: DashMap<ConnectionId, ClientSender>,
}

impl SignalBroadcaster {
    /// Erstellt einen neuen SignalBroadcaster
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(SignalBroadcasterInner {
                clients: DashMap::new(),
            }),
        }
    }

    /// Registriert einen neuen Client und gibt seine Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und sendet via TCP.
    pub fn client_registrieren(&self, verbindung: ConnectionId) -> mpsc::Receiver<ServerSignal> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let sender = ClientSender { verbindung, tx };
        self.inner.clients.insert(verbindung, sender);
        tracing::debug!(verbindung = %verbindung, "Client im Broadcaster registriert");
        rx
    }

    /// Entfernt einen Client aus dem Broadcaster
    pub fn client_entfernen(&self, verbindung: &ConnectionId) {
        self.inner.clients.remove(verbindung);
        tracing::debug!(verbindung = %verbindung, "Client aus Broadcaster entfernt");
    }

    /// Sendet ein Signal an einen einzelnen Client
    ///
    /// Gibt `true` zurueck wenn der Client gefunden und das Signal eingereiht wurde.
    pub fn an_verbindung_senden(&self, verbindung: &ConnectionId, signal: ServerSignal) -> bool {
        match self.inner.clients.get(verbindung) {
            Some(sender) => sender.senden(signal),
            None => {
                tracing::debug!(verbindung = %verbindung, "Senden an unbekannten Client");
                false
            }
        }
    }

    /// Sendet ein Signal an alle verbundenen Clients
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, signal: ServerSignal) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.value().senden(signal.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Gibt die Anzahl der registrierten Clients zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob ein Client registriert ist
    pub fn ist_registriert(&self, verbindung: &ConnectionId) -> bool {
        self.inner.clients.contains_key(verbindung)
    }
}

impl Default for SignalBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_registrieren_und_senden() {
        let broadcaster = SignalBroadcaster::neu();
        let conn = ConnectionId::new();

        let mut rx = broadcaster.client_registrieren(conn);
        assert!(broadcaster.ist_registriert(&conn));

        let gesendet = broadcaster.an_verbindung_senden(&conn, ServerSignal::CallEnded);
        assert!(gesendet);

        let empfangen = rx.try_recv().expect("Signal muss vorhanden sein");
        assert_eq!(empfangen, ServerSignal::CallEnded);
    }

    #[tokio::test]
    async fn senden_an_unbekannten_client() {
        let broadcaster = SignalBroadcaster::neu();
        let gesendet = broadcaster.an_verbindung_senden(&ConnectionId::new(), ServerSignal::CallEnded);
        assert!(!gesendet);
    }

    #[tokio::test]
    async fn an_alle_senden() {
        let broadcaster = SignalBroadcaster::neu();

        let conns: Vec<ConnectionId> = (0..5).map(|_| ConnectionId::new()).collect();
        let mut receivers: Vec<_> = conns
            .iter()
            .map(|conn| broadcaster.client_registrieren(*conn))
            .collect();

        let gesendet = broadcaster.an_alle_senden(ServerSignal::UserList {
            users: vec!["alice".into()],
        });
        assert_eq!(gesendet, 5);

        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn client_entfernen() {
        let broadcaster = SignalBroadcaster::neu();
        let conn = ConnectionId::new();

        let _rx = broadcaster.client_registrieren(conn);
        broadcaster.client_entfernen(&conn);

        assert!(!broadcaster.ist_registriert(&conn));
        assert_eq!(broadcaster.client_anzahl(), 0);
    }

    #[tokio::test]
    async fn senden_nach_receiver_drop_schlaegt_fehl() {
        let broadcaster = SignalBroadcaster::neu();
        let conn = ConnectionId::new();

        let rx = broadcaster.client_registrieren(conn);
        drop(rx);

        let gesendet = broadcaster.an_verbindung_senden(&conn, ServerSignal::CallRejected);
        assert!(!gesendet);
    }
}

//! Signal-Router – Routet ClientSignale an Verzeichnis und Sessions
//!
//! Der Router empfaengt deserialisierte [`ClientSignal`]e von einer
//! `ClientConnection`, bestimmt das betroffene Ziel (Verzeichnis,
//! bestehende Session oder neue Session) und stoesst die Verarbeitung an.
//!
//! ## Fehlverhalten von Clients
//! Signale an unbekannte Benutzer oder ohne zugehoerige Session werden
//! stillschweigend verworfen und nur per `debug!` geloggt. Ein
//! fehlverhaltender Client kann damit keine fremde Session beeinflussen.

use plausch_core::types::ConnectionId;
use plausch_protocol::signal::{
    CallType, ClientSignal, IceTransportState, ServerSignal, SessionDescription,
};
use std::sync::Arc;

use crate::error::SignalFehler;
use crate::server_state::SignalingState;
use crate::session::{AnrufPhase, AnrufRolle, TransportMeldung};

/// Zentraler Signal-Router
///
/// Routet eingehende ClientSignale an das Benutzerverzeichnis bzw. die
/// Session-Registry. Antworten laufen ausschliesslich ueber den
/// Broadcaster, nie direkt zurueck.
pub struct SignalRouter {
    state: Arc<SignalingState>,
}

impl SignalRouter {
    /// Erstellt einen neuen Router
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein eingehendes ClientSignal
    pub async fn dispatch(&self, quelle: ConnectionId, signal: ClientSignal) {
        match signal {
            ClientSignal::SetUsername { name } => {
                self.state.directory.namen_setzen(quelle, name);
                self.benutzerliste_senden();
            }

            ClientSignal::CallUser {
                to,
                offer,
                call_type,
            } => {
                self.anruf_behandeln(quelle, to, offer, call_type).await;
            }

            ClientSignal::CallAnswer { to: _, answer } => {
                let gefunden = self
                    .state
                    .registry
                    .ereignis(quelle, |s| s.antwort(quelle, answer))
                    .await;
                if !gefunden {
                    tracing::debug!(quelle = %quelle, "call-answer ohne Session – verworfen");
                }
            }

            ClientSignal::IceCandidate { to: _, candidate } => {
                let gefunden = self
                    .state
                    .registry
                    .ereignis(quelle, |s| s.kandidat(quelle, candidate))
                    .await;
                if !gefunden {
                    tracing::debug!(quelle = %quelle, "ice-candidate ohne Session – verworfen");
                }
            }

            ClientSignal::EndCall { to: _ } => {
                let gefunden = self
                    .state
                    .registry
                    .ereignis(quelle, |s| s.beenden(quelle))
                    .await;
                if !gefunden {
                    tracing::debug!(quelle = %quelle, "end-call ohne Session – verworfen");
                }
            }

            ClientSignal::RejectCall { to: _ } => {
                let gefunden = self
                    .state
                    .registry
                    .ereignis(quelle, |s| s.ablehnen(quelle))
                    .await;
                if !gefunden {
                    tracing::debug!(quelle = %quelle, "reject-call ohne Session – verworfen");
                }
            }

            ClientSignal::ConnectionState { state } => {
                let meldung = match state {
                    IceTransportState::Connected => TransportMeldung::Verbunden,
                    IceTransportState::Disconnected => TransportMeldung::Getrennt,
                    IceTransportState::Failed => TransportMeldung::Fehlgeschlagen,
                };
                self.state
                    .registry
                    .ereignis(quelle, |s| s.transport_zustand(quelle, meldung))
                    .await;
            }
        }
    }

    /// Behandelt `call-user`: neuer Anruf oder Renegotiation
    ///
    /// Steckt der Absender bereits in einer Session, ist das Offer
    /// entweder ein ICE-Restart (Anrufer in `Verbinden`) oder der
    /// Absender ist besetzt.
    async fn anruf_behandeln(
        &self,
        quelle: ConnectionId,
        to: String,
        offer: SessionDescription,
        call_type: CallType,
    ) {
        if let Some(eintrag) = self.state.registry.session_von(&quelle) {
            let mut e = eintrag.lock().await;
            if !e.session.ist_terminal() {
                let ist_restart = e.session.rolle_von(&quelle) == Some(AnrufRolle::Anrufer)
                    && e.session.phase() == AnrufPhase::Verbinden;
                if ist_restart {
                    tracing::info!(
                        session = %e.session.id(),
                        quelle = %quelle,
                        "Renegotiation-Offer wird weitergereicht"
                    );
                    let aktionen = e.session.angebot(quelle, offer);
                    self.state.registry.ausfuehren(&mut e, aktionen);
                } else {
                    self.state
                        .broadcaster
                        .an_verbindung_senden(&quelle, ServerSignal::CallBusy);
                }
                return;
            }
        }

        let Some(ziel) = self.state.directory.aufloesen(&to) else {
            tracing::debug!(quelle = %quelle, ziel = %to, "Anruf an unbekannten Benutzer – verworfen");
            return;
        };
        if ziel == quelle {
            tracing::debug!(quelle = %quelle, "Anruf an sich selbst – verworfen");
            return;
        }

        let anrufer_name = self
            .state
            .directory
            .anzeigename(&quelle)
            .unwrap_or_else(|| "Anonymous".to_string());

        match self
            .state
            .registry
            .anruf_starten(quelle, anrufer_name, ziel, offer, call_type)
            .await
        {
            Ok(()) => {}
            Err(SignalFehler::BereitsImAnruf) => {
                self.state
                    .broadcaster
                    .an_verbindung_senden(&quelle, ServerSignal::CallBusy);
            }
            Err(SignalFehler::GegenstelleBeschaeftigt) => {
                // Besetztes Ziel wird nicht gestoert; der Anrufer erhaelt
                // eine Ablehnung
                self.state
                    .broadcaster
                    .an_verbindung_senden(&quelle, ServerSignal::CallRejected);
            }
            Err(e) => {
                tracing::warn!(quelle = %quelle, fehler = %e, "Anruf-Start fehlgeschlagen");
            }
        }
    }

    /// Raeumt beim Disconnect einer Verbindung auf
    ///
    /// Beendet eine laufende Session (die Gegenstelle erhaelt
    /// `call-ended`), entfernt den Anzeigenamen und verteilt die
    /// aktualisierte Benutzerliste.
    pub async fn verbindung_getrennt(&self, quelle: ConnectionId) {
        self.state
            .registry
            .ereignis(quelle, |s| s.beenden(quelle))
            .await;
        self.state.directory.verbindung_getrennt(&quelle);
        self.state.broadcaster.client_entfernen(&quelle);
        self.benutzerliste_senden();
    }

    /// Verteilt die aktuelle Benutzerliste an alle Clients
    fn benutzerliste_senden(&self) {
        let users = self.state.directory.benutzerliste();
        self.state
            .broadcaster
            .an_alle_senden(ServerSignal::UserList { users });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

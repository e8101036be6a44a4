//! Session-Registry – Prozessweite Verwaltung aller Anruf-Sessions
//!
//! Die Registry ist die einzige veraenderliche geteilte Struktur des
//! Signaling-Kerns. Sie bildet jede Verbindung auf ihre hoechstens eine
//! aktive [`CallSession`] ab (beide Teilnehmer zeigen auf dieselbe
//! Session-Instanz) und garantiert:
//!
//! - Insert-if-absent beim Anlegen: ein zweiter Anruf-Versuch waehrend
//!   eine Session nicht-terminal ist wird abgelehnt
//! - Serialisierung pro Session via tokio-Mutex: Ereignisse beider
//!   Teilnehmer werden nacheinander angewandt
//! - Atomares Entfernen bei terminaler Transition: ein verspaetetes
//!   Ereignis (z.B. ein ICE-Kandidat nach `end-call`) ist garantiert
//!   wirkungslos statt die Session wiederzubeleben
//!
//! Die Registry fuehrt ausserdem die zeitgesteuerten Transitionen aus:
//! Deadline-Timer und ICE-Restart-Backoff laufen als tokio-Tasks und
//! werden beim Erreichen von `Aktiv` bzw. einer terminalen Phase
//! abgebrochen.

use dashmap::DashMap;
use plausch_core::types::ConnectionId;
use plausch_protocol::signal::{CallType, SessionDescription};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::broadcast::SignalBroadcaster;
use crate::error::{SignalFehler, SignalResult};
use crate::session::{AnrufRegeln, CallSession, SessionAktion};

// ---------------------------------------------------------------------------
// SessionEintrag
// ---------------------------------------------------------------------------

/// Eine Session samt ihrer laufenden Timer-Tasks
///
/// Die Timer-Handles leben neben der Session hinter demselben Mutex,
/// damit Starten und Abbrechen unter dem Session-Lock passieren.
pub struct SessionEintrag {
    pub session: CallSession,
    deadline_task: Option<JoinHandle<()>>,
    restart_task: Option<JoinHandle<()>>,
}

impl SessionEintrag {
    fn neu(session: CallSession) -> Self {
        Self {
            session,
            deadline_task: None,
            restart_task: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Prozessweite Abbildung `ConnectionId -> CallSession`
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

struct SessionRegistryInner {
    /// Teilnehmer-Verbindung -> gemeinsamer Session-Eintrag
    sessions: DashMap<ConnectionId, Arc<Mutex<SessionEintrag>>>,
    /// Versand von ServerSignalen an die Clients
    broadcaster: SignalBroadcaster,
    /// Zeit- und Wiederholungsregeln fuer neue Sessions
    regeln: AnrufRegeln,
    /// Serialisiert Mehr-Schluessel-Mutationen (Anlegen/Entfernen beider Keys)
    schreib_sperre: parking_lot::Mutex<()>,
}

impl SessionRegistry {
    /// Erstellt eine neue, leere Registry
    pub fn neu(broadcaster: SignalBroadcaster, regeln: AnrufRegeln) -> Self {
        Self {
            inner: Arc::new(SessionRegistryInner {
                sessions: DashMap::new(),
                broadcaster,
                regeln,
                schreib_sperre: parking_lot::Mutex::new(()),
            }),
        }
    }

    /// Startet einen neuen Anruf-Versuch
    ///
    /// Legt die Session fuer beide Teilnehmer an (insert-if-absent),
    /// startet den Deadline-Timer und stellt das Offer als
    /// `incoming-call` zu.
    pub async fn anruf_starten(
        &self,
        anrufer: ConnectionId,
        anrufer_name: impl Into<String>,
        angerufener: ConnectionId,
        offer: SessionDescription,
        call_type: CallType,
    ) -> SignalResult<()> {
        let eintrag = {
            let _guard = self.inner.schreib_sperre.lock();

            if self.inner.sessions.contains_key(&anrufer) {
                return Err(SignalFehler::BereitsImAnruf);
            }
            if self.inner.sessions.contains_key(&angerufener) {
                return Err(SignalFehler::GegenstelleBeschaeftigt);
            }

            let session = CallSession::neu(
                anrufer,
                anrufer_name,
                angerufener,
                call_type,
                self.inner.regeln,
            );
            tracing::info!(
                session = %session.id(),
                anrufer = %anrufer,
                angerufener = %angerufener,
                call_type = %call_type,
                "Anruf-Session angelegt"
            );

            let eintrag = Arc::new(Mutex::new(SessionEintrag::neu(session)));
            self.inner.sessions.insert(anrufer, Arc::clone(&eintrag));
            self.inner.sessions.insert(angerufener, Arc::clone(&eintrag));
            eintrag
        };

        let mut e = eintrag.lock().await;
        let aktionen = e.session.angebot(anrufer, offer);
        self.ausfuehren(&mut e, aktionen);
        e.session.zugestellt();
        Ok(())
    }

    /// Gibt den Session-Eintrag einer Verbindung zurueck
    ///
    /// Der Aufrufer muss nach dem Lock pruefen ob die Session noch
    /// nicht-terminal ist; ein alter Arc kann eine bereits entfernte
    /// Session referenzieren.
    pub fn session_von(&self, verbindung: &ConnectionId) -> Option<Arc<Mutex<SessionEintrag>>> {
        self.inner
            .sessions
            .get(verbindung)
            .map(|e| Arc::clone(e.value()))
    }

    /// Prueft ob eine Verbindung in einer Session steckt
    pub fn ist_im_anruf(&self, verbindung: &ConnectionId) -> bool {
        self.inner.sessions.contains_key(verbindung)
    }

    /// Gibt die Anzahl der Sessions zurueck (jede zaehlt zwei Schluessel)
    pub fn anzahl_eintraege(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Wendet ein Ereignis auf die Session einer Verbindung an
    ///
    /// Lockt die Session, laesst die Zustandsmaschine das Ereignis
    /// verarbeiten und fuehrt die resultierenden Aktionen aus. Gibt
    /// `false` zurueck wenn die Verbindung keine Session (mehr) hat.
    pub async fn ereignis<F>(&self, verbindung: ConnectionId, ereignis: F) -> bool
    where
        F: FnOnce(&mut CallSession) -> Vec<SessionAktion>,
    {
        let Some(eintrag) = self.session_von(&verbindung) else {
            return false;
        };

        let mut e = eintrag.lock().await;
        let aktionen = ereignis(&mut e.session);
        self.ausfuehren(&mut e, aktionen);
        true
    }

    /// Fuehrt die von der Zustandsmaschine angeforderten Aktionen aus
    ///
    /// Muss unter dem Session-Lock laufen; die Reihenfolge der Aktionen
    /// bleibt erhalten.
    pub(crate) fn ausfuehren(&self, eintrag: &mut SessionEintrag, aktionen: Vec<SessionAktion>) {
        for aktion in aktionen {
            match aktion {
                SessionAktion::Senden { an, signal } => {
                    self.inner.broadcaster.an_verbindung_senden(&an, signal);
                }
                SessionAktion::DeadlineStarten { dauer } => {
                    let registry = self.clone();
                    let schluessel = eintrag.session.anrufer();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(dauer).await;
                        registry
                            .ereignis(schluessel, |s| s.deadline_abgelaufen())
                            .await;
                    });
                    if let Some(alte) = eintrag.deadline_task.replace(task) {
                        alte.abort();
                    }
                }
                SessionAktion::DeadlineAbbrechen => {
                    if let Some(task) = eintrag.deadline_task.take() {
                        task.abort();
                    }
                }
                SessionAktion::RestartPlanen { verzoegerung } => {
                    let registry = self.clone();
                    let schluessel = eintrag.session.anrufer();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(verzoegerung).await;
                        registry.ereignis(schluessel, |s| s.restart_faellig()).await;
                    });
                    if let Some(alte) = eintrag.restart_task.replace(task) {
                        alte.abort();
                    }
                }
                SessionAktion::RestartAbbrechen => {
                    if let Some(task) = eintrag.restart_task.take() {
                        task.abort();
                    }
                }
                SessionAktion::Entfernen => {
                    let _guard = self.inner.schreib_sperre.lock();
                    self.inner.sessions.remove(&eintrag.session.anrufer());
                    self.inner.sessions.remove(&eintrag.session.angerufener());
                    tracing::debug!(
                        session = %eintrag.session.id(),
                        "Session aus Registry entfernt"
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use plausch_protocol::signal::{IceCandidateInit, ServerSignal};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn kandidat(n: u32) -> IceCandidateInit {
        IceCandidateInit {
            candidate: format!("candidate:{n}"),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }

    struct Aufbau {
        registry: SessionRegistry,
        broadcaster: SignalBroadcaster,
        anrufer: ConnectionId,
        angerufener: ConnectionId,
        rx_anrufer: mpsc::Receiver<ServerSignal>,
        rx_angerufener: mpsc::Receiver<ServerSignal>,
    }

    fn aufbau_mit(regeln: AnrufRegeln) -> Aufbau {
        let broadcaster = SignalBroadcaster::neu();
        let registry = SessionRegistry::neu(broadcaster.clone(), regeln);
        let anrufer = ConnectionId::new();
        let angerufener = ConnectionId::new();
        let rx_anrufer = broadcaster.client_registrieren(anrufer);
        let rx_angerufener = broadcaster.client_registrieren(angerufener);
        Aufbau {
            registry,
            broadcaster,
            anrufer,
            angerufener,
            rx_anrufer,
            rx_angerufener,
        }
    }

    fn aufbau() -> Aufbau {
        aufbau_mit(AnrufRegeln::default())
    }

    async fn anruf_starten(a: &Aufbau) {
        a.registry
            .anruf_starten(
                a.anrufer,
                "alice",
                a.angerufener,
                SessionDescription::offer("v=0"),
                CallType::Audio,
            )
            .await
            .expect("Anruf muss starten");
    }

    /// Sammelt alle sofort verfuegbaren Signale aus einer Queue
    fn abholen(rx: &mut mpsc::Receiver<ServerSignal>) -> Vec<ServerSignal> {
        let mut signale = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signale.push(signal);
        }
        signale
    }

    #[tokio::test]
    async fn anruf_starten_stellt_incoming_call_zu() {
        let mut a = aufbau();
        anruf_starten(&a).await;

        let signale = abholen(&mut a.rx_angerufener);
        assert!(matches!(
            signale[..],
            [ServerSignal::IncomingCall { .. }]
        ));
        assert!(a.registry.ist_im_anruf(&a.anrufer));
        assert!(a.registry.ist_im_anruf(&a.angerufener));
    }

    #[tokio::test]
    async fn zweiter_anruf_wird_abgelehnt() {
        let a = aufbau();
        anruf_starten(&a).await;

        let dritter = ConnectionId::new();
        let fehler = a
            .registry
            .anruf_starten(
                a.anrufer,
                "alice",
                dritter,
                SessionDescription::offer("v=1"),
                CallType::Video,
            )
            .await
            .unwrap_err();
        assert!(matches!(fehler, SignalFehler::BereitsImAnruf));

        // Die bestehende Session bleibt unberuehrt
        assert!(a.registry.ist_im_anruf(&a.anrufer));
        assert!(a.registry.ist_im_anruf(&a.angerufener));
        assert!(!a.registry.ist_im_anruf(&dritter));
    }

    #[tokio::test]
    async fn anruf_an_beschaeftigtes_ziel_wird_abgelehnt() {
        let a = aufbau();
        anruf_starten(&a).await;

        let dritter = ConnectionId::new();
        let fehler = a
            .registry
            .anruf_starten(
                dritter,
                "carol",
                a.angerufener,
                SessionDescription::offer("v=1"),
                CallType::Audio,
            )
            .await
            .unwrap_err();
        assert!(matches!(fehler, SignalFehler::GegenstelleBeschaeftigt));
        assert!(!a.registry.ist_im_anruf(&dritter));
    }

    #[tokio::test]
    async fn beenden_entfernt_beide_schluessel() {
        let mut a = aufbau();
        anruf_starten(&a).await;

        let anrufer = a.anrufer;
        a.registry.ereignis(anrufer, |s| s.beenden(anrufer)).await;

        assert!(!a.registry.ist_im_anruf(&a.anrufer));
        assert!(!a.registry.ist_im_anruf(&a.angerufener));
        assert_eq!(a.registry.anzahl_eintraege(), 0);

        let signale = abholen(&mut a.rx_angerufener);
        assert!(signale.contains(&ServerSignal::CallEnded));
    }

    #[tokio::test]
    async fn verspaetetes_ereignis_nach_ende_ist_wirkungslos() {
        let mut a = aufbau();
        anruf_starten(&a).await;

        let anrufer = a.anrufer;
        a.registry.ereignis(anrufer, |s| s.beenden(anrufer)).await;
        abholen(&mut a.rx_angerufener);

        // Ein verspaeteter Kandidat findet keine Session mehr
        let gefunden = a
            .registry
            .ereignis(anrufer, |s| s.kandidat(anrufer, kandidat(1)))
            .await;
        assert!(!gefunden);
        assert!(abholen(&mut a.rx_angerufener).is_empty());
    }

    #[tokio::test]
    async fn gleichzeitiges_beenden_benachrichtigt_genau_einmal() {
        let mut a = aufbau();
        anruf_starten(&a).await;
        abholen(&mut a.rx_angerufener);

        let (anrufer, angerufener) = (a.anrufer, a.angerufener);
        a.registry.ereignis(anrufer, |s| s.beenden(anrufer)).await;
        a.registry
            .ereignis(angerufener, |s| s.beenden(angerufener))
            .await;

        // Jede Seite erhaelt hoechstens ein call-ended
        let an_angerufenen = abholen(&mut a.rx_angerufener);
        let an_anrufer = abholen(&mut a.rx_anrufer);
        assert_eq!(
            an_angerufenen
                .iter()
                .filter(|s| **s == ServerSignal::CallEnded)
                .count(),
            1
        );
        assert_eq!(
            an_anrufer
                .iter()
                .filter(|s| **s == ServerSignal::CallEnded)
                .count(),
            0,
            "das zweite Beenden war ein No-op"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_laesst_unverbundene_session_fehlschlagen() {
        let regeln = AnrufRegeln {
            deadline: Duration::from_millis(100),
            ..AnrufRegeln::default()
        };
        let mut a = aufbau_mit(regeln);
        anruf_starten(&a).await;
        abholen(&mut a.rx_angerufener);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!a.registry.ist_im_anruf(&a.anrufer));
        let an_anrufer = abholen(&mut a.rx_anrufer);
        let an_angerufenen = abholen(&mut a.rx_angerufener);
        assert_eq!(an_anrufer, vec![ServerSignal::CallEnded]);
        assert_eq!(an_angerufenen, vec![ServerSignal::CallEnded]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wird_bei_aktiv_abgebrochen() {
        use crate::session::TransportMeldung;

        let regeln = AnrufRegeln {
            deadline: Duration::from_millis(100),
            ..AnrufRegeln::default()
        };
        let mut a = aufbau_mit(regeln);
        anruf_starten(&a).await;

        let (anrufer, angerufener) = (a.anrufer, a.angerufener);
        a.registry
            .ereignis(angerufener, |s| {
                s.antwort(angerufener, SessionDescription::answer("v=0"))
            })
            .await;
        a.registry
            .ereignis(anrufer, |s| {
                s.transport_zustand(anrufer, TransportMeldung::Verbunden)
            })
            .await;
        abholen(&mut a.rx_anrufer);
        abholen(&mut a.rx_angerufener);

        tokio::time::sleep(Duration::from_millis(500)).await;

        // Kein Timeout: Session lebt, niemand bekam call-ended
        assert!(a.registry.ist_im_anruf(&a.anrufer));
        assert!(abholen(&mut a.rx_anrufer).is_empty());
        assert!(abholen(&mut a.rx_angerufener).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ice_restart_wird_nach_backoff_angefordert() {
        use crate::session::TransportMeldung;

        let regeln = AnrufRegeln {
            restart_backoff: Duration::from_millis(50),
            ..AnrufRegeln::default()
        };
        let mut a = aufbau_mit(regeln);
        anruf_starten(&a).await;

        let (anrufer, angerufener) = (a.anrufer, a.angerufener);
        a.registry
            .ereignis(angerufener, |s| {
                s.antwort(angerufener, SessionDescription::answer("v=0"))
            })
            .await;
        abholen(&mut a.rx_anrufer);
        abholen(&mut a.rx_angerufener);

        a.registry
            .ereignis(anrufer, |s| {
                s.transport_zustand(anrufer, TransportMeldung::Fehlgeschlagen)
            })
            .await;

        // Vor dem Backoff keine Aufforderung
        assert!(abholen(&mut a.rx_anrufer).is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;

        let an_anrufer = abholen(&mut a.rx_anrufer);
        assert_eq!(an_anrufer, vec![ServerSignal::RestartIce { attempt: 1 }]);
        // Nur der Anrufer treibt den Restart
        assert!(abholen(&mut a.rx_angerufener).is_empty());
    }

    #[tokio::test]
    async fn broadcaster_bleibt_nutzbar_nach_session_ende() {
        let mut a = aufbau();
        anruf_starten(&a).await;

        let anrufer = a.anrufer;
        a.registry.ereignis(anrufer, |s| s.beenden(anrufer)).await;

        assert!(a
            .broadcaster
            .an_verbindung_senden(&a.anrufer, ServerSignal::CallRejected));
        assert!(abholen(&mut a.rx_anrufer).contains(&ServerSignal::CallRejected));
    }
}

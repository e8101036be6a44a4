//! Anruf-Session – Zustandsmaschine fuer einen Anruf-Versuch
//!
//! Eine `CallSession` verfolgt genau einen Anruf-Versuch zwischen Anrufer
//! und Angerufenem: Phase, gepufferte ICE-Kandidaten, Restart-Versuche und
//! Deadline. Die Zustandsmaschine ist rein synchron; jede Methode nimmt ein
//! Ereignis entgegen und gibt die auszufuehrenden [`SessionAktion`]en
//! zurueck. Timer und Versand uebernimmt die [`crate::registry::SessionRegistry`].
//!
//! ## Phasen
//! ```text
//! Bereit -> Anbieten -> Klingeln -> Beantwortet -> Verbinden -> Aktiv
//!                                                      ^           |
//!                                                      +- getrennt-+
//! Beendet / Fehlgeschlagen (terminal, aus jeder nicht-terminalen Phase)
//! ```
//!
//! Jede (Phase, Ereignis)-Kombination ist definiert; nicht passende
//! Ereignisse werden ignoriert und geloggt, nie als Fehler propagiert.
//! Eine terminale Session verarbeitet kein Ereignis mehr (Idempotenz).

use plausch_core::types::{ConnectionId, SessionId};
use plausch_protocol::signal::{CallType, IceCandidateInit, ServerSignal, SessionDescription};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Regeln & Phasen
// ---------------------------------------------------------------------------

/// Zeit- und Wiederholungsregeln fuer Anruf-Sessions
#[derive(Debug, Clone, Copy)]
pub struct AnrufRegeln {
    /// Frist bis eine unverbundene Session zwangsweise fehlschlaegt
    pub deadline: Duration,
    /// Frist fuer die Wiederverbindung nach `Aktiv -> getrennt`
    pub grace: Duration,
    /// Wartezeit vor einem ICE-Restart
    pub restart_backoff: Duration,
    /// Maximale Anzahl ICE-Restarts bevor die Session fehlschlaegt
    pub max_versuche: u32,
}

impl Default for AnrufRegeln {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            grace: Duration::from_secs(10),
            restart_backoff: Duration::from_millis(1000),
            max_versuche: 3,
        }
    }
}

/// Phase eines Anruf-Versuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufPhase {
    /// Session angelegt, Offer noch nicht zugestellt
    Bereit,
    /// Offer wird dem Angerufenen zugestellt
    Anbieten,
    /// Offer zugestellt, Angerufener hat noch nicht reagiert
    Klingeln,
    /// Angerufener hat angenommen, Answer wird erzeugt (kurzlebig)
    Beantwortet,
    /// Answer ausgetauscht, ICE-Verhandlung laeuft
    Verbinden,
    /// Peer-to-Peer-Verbindung steht
    Aktiv,
    /// Regulaer beendet (terminal)
    Beendet,
    /// Durch Timeout oder ICE-Erschoepfung fehlgeschlagen (terminal)
    Fehlgeschlagen,
}

impl AnrufPhase {
    /// Prueft ob die Phase terminal ist
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Beendet | Self::Fehlgeschlagen)
    }
}

/// Rolle eines Teilnehmers innerhalb einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrufRolle {
    Anrufer,
    Angerufener,
}

// ---------------------------------------------------------------------------
// Aktionen
// ---------------------------------------------------------------------------

/// Von der Zustandsmaschine angeforderte Seiteneffekte
///
/// Die Registry fuehrt die Aktionen in der zurueckgegebenen Reihenfolge
/// aus; insbesondere die Reihenfolge der `Senden`-Aktionen ist Teil der
/// Korrektheit (FIFO-Nachlieferung gepufferter Kandidaten).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAktion {
    /// Signal an einen Teilnehmer senden
    Senden {
        an: ConnectionId,
        signal: ServerSignal,
    },
    /// Deadline-Timer (neu) starten
    DeadlineStarten { dauer: Duration },
    /// Deadline-Timer abbrechen
    DeadlineAbbrechen,
    /// ICE-Restart nach Backoff einplanen
    RestartPlanen { verzoegerung: Duration },
    /// Geplanten ICE-Restart abbrechen
    RestartAbbrechen,
    /// Session aus der Registry entfernen (terminale Phase erreicht)
    Entfernen,
}

// ---------------------------------------------------------------------------
// CallSession
// ---------------------------------------------------------------------------

/// Zustandsmaschine eines Anruf-Versuchs
///
/// Beide Teilnehmer teilen sich eine Session-Instanz; die Registry haelt
/// sie hinter einem Mutex, damit Ereignisse beider Seiten serialisiert
/// verarbeitet werden.
pub struct CallSession {
    id: SessionId,
    phase: AnrufPhase,
    anrufer: ConnectionId,
    anrufer_name: String,
    angerufener: ConnectionId,
    call_type: CallType,
    regeln: AnrufRegeln,
    /// Hat der Anrufer seine Remote-Description (das Answer) angewandt?
    remote_gesetzt_anrufer: bool,
    /// Hat der Angerufene seine Remote-Description (das Offer) angewandt?
    remote_gesetzt_angerufener: bool,
    /// Kandidaten fuer den Anrufer, wartend bis dessen Remote-Description steht
    puffer_anrufer: Vec<IceCandidateInit>,
    /// Kandidaten fuer den Angerufenen, wartend bis dessen Remote-Description steht
    puffer_angerufener: Vec<IceCandidateInit>,
    /// Bisher verbrauchte ICE-Restart-Versuche
    versuche: u32,
}

impl CallSession {
    /// Erstellt eine neue Session in der Phase `Bereit`
    pub fn neu(
        anrufer: ConnectionId,
        anrufer_name: impl Into<String>,
        angerufener: ConnectionId,
        call_type: CallType,
        regeln: AnrufRegeln,
    ) -> Self {
        Self {
            id: SessionId::new(),
            phase: AnrufPhase::Bereit,
            anrufer,
            anrufer_name: anrufer_name.into(),
            angerufener,
            call_type,
            regeln,
            remote_gesetzt_anrufer: false,
            remote_gesetzt_angerufener: false,
            puffer_anrufer: Vec::new(),
            puffer_angerufener: Vec::new(),
            versuche: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Accessoren
    // -----------------------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> AnrufPhase {
        self.phase
    }

    pub fn anrufer(&self) -> ConnectionId {
        self.anrufer
    }

    pub fn angerufener(&self) -> ConnectionId {
        self.angerufener
    }

    pub fn versuche(&self) -> u32 {
        self.versuche
    }

    pub fn ist_terminal(&self) -> bool {
        self.phase.ist_terminal()
    }

    /// Gibt die Rolle einer Verbindung in dieser Session zurueck
    pub fn rolle_von(&self, verbindung: &ConnectionId) -> Option<AnrufRolle> {
        if *verbindung == self.anrufer {
            Some(AnrufRolle::Anrufer)
        } else if *verbindung == self.angerufener {
            Some(AnrufRolle::Angerufener)
        } else {
            None
        }
    }

    /// Gibt die Gegenstelle eines Teilnehmers zurueck
    pub fn gegenstelle(&self, verbindung: &ConnectionId) -> ConnectionId {
        if *verbindung == self.anrufer {
            self.angerufener
        } else {
            self.anrufer
        }
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    /// Offer des Anrufers verarbeiten
    ///
    /// Aus `Bereit` startet dies den Anruf-Versuch (Deadline-Timer +
    /// `incoming-call` an den Angerufenen). Aus `Verbinden` transportiert
    /// dieselbe Nachricht das frische Offer eines ICE-Restarts; die Phase
    /// bleibt unveraendert.
    pub fn angebot(
        &mut self,
        von: ConnectionId,
        offer: SessionDescription,
    ) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() {
            return vec![];
        }
        if von != self.anrufer {
            self.ignorieren("angebot", "nur der Anrufer sendet Offers");
            return vec![];
        }

        match self.phase {
            AnrufPhase::Bereit => {
                self.phase = AnrufPhase::Anbieten;
                vec![
                    SessionAktion::DeadlineStarten {
                        dauer: self.regeln.deadline,
                    },
                    SessionAktion::Senden {
                        an: self.angerufener,
                        signal: self.eingehender_anruf(offer),
                    },
                ]
            }
            AnrufPhase::Verbinden => {
                // Renegotiation nach ICE-Restart: Offer durchreichen,
                // kein Phasenwechsel
                vec![SessionAktion::Senden {
                    an: self.angerufener,
                    signal: self.eingehender_anruf(offer),
                }]
            }
            _ => {
                self.ignorieren("angebot", "Offer passt nicht zur Phase");
                vec![]
            }
        }
    }

    /// Markiert das Offer als zugestellt (`Anbieten -> Klingeln`)
    pub fn zugestellt(&mut self) {
        if self.phase == AnrufPhase::Anbieten {
            self.phase = AnrufPhase::Klingeln;
        }
    }

    /// Answer des Angerufenen verarbeiten
    ///
    /// Der Angerufene hat vor dem Erzeugen des Answers das Offer als
    /// Remote-Description angewandt; seine gepufferten Kandidaten werden
    /// zuerst in Ankunftsreihenfolge nachgeliefert. Danach geht das Answer
    /// an den Anrufer, gefolgt von dessen gepufferten Kandidaten.
    pub fn antwort(
        &mut self,
        von: ConnectionId,
        answer: SessionDescription,
    ) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() {
            return vec![];
        }
        if von != self.angerufener {
            self.ignorieren("antwort", "nur der Angerufene sendet Answers");
            return vec![];
        }

        match self.phase {
            AnrufPhase::Anbieten | AnrufPhase::Klingeln => {
                self.phase = AnrufPhase::Beantwortet;

                let mut aktionen = Vec::new();

                self.remote_gesetzt_angerufener = true;
                aktionen.extend(Self::puffer_leeren(
                    &mut self.puffer_angerufener,
                    self.angerufener,
                ));

                aktionen.push(SessionAktion::Senden {
                    an: self.anrufer,
                    signal: ServerSignal::CallAnswered { answer },
                });

                self.remote_gesetzt_anrufer = true;
                aktionen.extend(Self::puffer_leeren(&mut self.puffer_anrufer, self.anrufer));

                self.phase = AnrufPhase::Verbinden;
                tracing::debug!(session = %self.id, "Answer weitergereicht, ICE-Verhandlung laeuft");
                aktionen
            }
            _ => {
                self.ignorieren("antwort", "Answer ohne passendes Offer");
                vec![]
            }
        }
    }

    /// ICE-Kandidat eines Teilnehmers verarbeiten
    ///
    /// Hat die Gegenstelle ihre Remote-Description noch nicht angewandt,
    /// wird der Kandidat gepuffert statt verworfen; andernfalls wird er
    /// sofort weitergereicht.
    pub fn kandidat(
        &mut self,
        von: ConnectionId,
        kandidat: IceCandidateInit,
    ) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() {
            return vec![];
        }
        let ziel_rolle = match self.rolle_von(&von) {
            Some(AnrufRolle::Anrufer) => AnrufRolle::Angerufener,
            Some(AnrufRolle::Angerufener) => AnrufRolle::Anrufer,
            None => {
                self.ignorieren("kandidat", "Absender ist kein Teilnehmer");
                return vec![];
            }
        };

        let (ziel, remote_gesetzt, puffer) = match ziel_rolle {
            AnrufRolle::Anrufer => (
                self.anrufer,
                self.remote_gesetzt_anrufer,
                &mut self.puffer_anrufer,
            ),
            AnrufRolle::Angerufener => (
                self.angerufener,
                self.remote_gesetzt_angerufener,
                &mut self.puffer_angerufener,
            ),
        };

        if remote_gesetzt {
            vec![SessionAktion::Senden {
                an: ziel,
                signal: ServerSignal::IceCandidate { candidate: kandidat },
            }]
        } else {
            puffer.push(kandidat);
            tracing::trace!(
                session = %self.id,
                wartend = puffer.len(),
                "ICE-Kandidat gepuffert (Remote-Description fehlt noch)"
            );
            vec![]
        }
    }

    /// Ablehnung des Angerufenen verarbeiten (`Klingeln -> Beendet`)
    pub fn ablehnen(&mut self, von: ConnectionId) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() {
            return vec![];
        }
        if von != self.angerufener {
            self.ignorieren("ablehnen", "nur der Angerufene lehnt ab");
            return vec![];
        }

        match self.phase {
            AnrufPhase::Anbieten | AnrufPhase::Klingeln => {
                self.phase = AnrufPhase::Beendet;
                tracing::info!(session = %self.id, "Anruf abgelehnt");

                let mut aktionen = vec![SessionAktion::Senden {
                    an: self.anrufer,
                    signal: ServerSignal::CallRejected,
                }];
                aktionen.extend(Self::aufraeumen());
                aktionen
            }
            _ => {
                self.ignorieren("ablehnen", "Ablehnung passt nicht zur Phase");
                vec![]
            }
        }
    }

    /// Beendet die Session auf Wunsch eines Teilnehmers oder bei Disconnect
    ///
    /// Idempotent: eine bereits terminale Session liefert keine Aktionen.
    pub fn beenden(&mut self, von: ConnectionId) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() {
            return vec![];
        }
        if self.rolle_von(&von).is_none() {
            self.ignorieren("beenden", "Absender ist kein Teilnehmer");
            return vec![];
        }

        self.phase = AnrufPhase::Beendet;
        tracing::info!(session = %self.id, "Anruf beendet");

        let mut aktionen = vec![SessionAktion::Senden {
            an: self.gegenstelle(&von),
            signal: ServerSignal::CallEnded,
        }];
        aktionen.extend(Self::aufraeumen());
        aktionen
    }

    /// Vom Client gemeldeten ICE-Transportzustand verarbeiten
    pub fn transport_zustand(
        &mut self,
        von: ConnectionId,
        meldung: TransportMeldung,
    ) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() {
            return vec![];
        }
        if self.rolle_von(&von).is_none() {
            self.ignorieren("transport_zustand", "Absender ist kein Teilnehmer");
            return vec![];
        }

        match (self.phase, meldung) {
            (AnrufPhase::Beantwortet | AnrufPhase::Verbinden, TransportMeldung::Verbunden) => {
                self.phase = AnrufPhase::Aktiv;
                self.versuche = 0;
                tracing::info!(session = %self.id, "Anruf aktiv");
                vec![
                    SessionAktion::DeadlineAbbrechen,
                    SessionAktion::RestartAbbrechen,
                ]
            }
            (AnrufPhase::Aktiv, TransportMeldung::Verbunden) => vec![],
            (AnrufPhase::Aktiv, TransportMeldung::Getrennt) => {
                // Kulanzfrist: zurueck in die Verhandlung, neue Deadline
                self.phase = AnrufPhase::Verbinden;
                tracing::info!(session = %self.id, "ICE getrennt – Kulanzfrist laeuft");
                vec![SessionAktion::DeadlineStarten {
                    dauer: self.regeln.grace,
                }]
            }
            (AnrufPhase::Verbinden, TransportMeldung::Fehlgeschlagen) => self.ice_fehlschlag(),
            (AnrufPhase::Aktiv, TransportMeldung::Fehlgeschlagen) => {
                self.phase = AnrufPhase::Verbinden;
                self.ice_fehlschlag()
            }
            _ => {
                self.ignorieren("transport_zustand", "Zustandsmeldung passt nicht zur Phase");
                vec![]
            }
        }
    }

    /// Deadline-Timer abgelaufen
    ///
    /// Wirkt nur solange die Session weder `Aktiv` noch terminal ist; ein
    /// verspaetet feuernder Timer ist damit garantiert wirkungslos.
    pub fn deadline_abgelaufen(&mut self) -> Vec<SessionAktion> {
        if self.phase.ist_terminal() || self.phase == AnrufPhase::Aktiv {
            return vec![];
        }

        tracing::info!(session = %self.id, phase = ?self.phase, "Anruf-Deadline abgelaufen");
        self.fehlschlagen()
    }

    /// Backoff-Timer fuer den ICE-Restart abgelaufen
    ///
    /// Nur der Anrufer treibt den ICE-Restart; er wird aufgefordert ein
    /// frisches Offer zu erzeugen.
    pub fn restart_faellig(&mut self) -> Vec<SessionAktion> {
        if self.phase != AnrufPhase::Verbinden {
            return vec![];
        }

        tracing::info!(session = %self.id, versuch = self.versuche, "ICE-Restart angefordert");
        vec![SessionAktion::Senden {
            an: self.anrufer,
            signal: ServerSignal::RestartIce {
                attempt: self.versuche,
            },
        }]
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn eingehender_anruf(&self, offer: SessionDescription) -> ServerSignal {
        ServerSignal::IncomingCall {
            from: self.anrufer_name.clone(),
            offer,
            call_type: self.call_type,
            socket_id: self.anrufer,
        }
    }

    fn ice_fehlschlag(&mut self) -> Vec<SessionAktion> {
        if self.versuche < self.regeln.max_versuche {
            self.versuche += 1;
            tracing::info!(
                session = %self.id,
                versuch = self.versuche,
                max = self.regeln.max_versuche,
                "ICE fehlgeschlagen – Restart geplant"
            );
            vec![SessionAktion::RestartPlanen {
                verzoegerung: self.regeln.restart_backoff,
            }]
        } else {
            tracing::warn!(session = %self.id, "ICE-Versuche erschoepft");
            self.fehlschlagen()
        }
    }

    /// Terminale Transition nach `Fehlgeschlagen` mit genau einer
    /// Benachrichtigung pro Teilnehmer
    fn fehlschlagen(&mut self) -> Vec<SessionAktion> {
        self.phase = AnrufPhase::Fehlgeschlagen;

        let mut aktionen = vec![
            SessionAktion::Senden {
                an: self.anrufer,
                signal: ServerSignal::CallEnded,
            },
            SessionAktion::Senden {
                an: self.angerufener,
                signal: ServerSignal::CallEnded,
            },
        ];
        aktionen.extend(Self::aufraeumen());
        aktionen
    }

    fn aufraeumen() -> Vec<SessionAktion> {
        vec![
            SessionAktion::DeadlineAbbrechen,
            SessionAktion::RestartAbbrechen,
            SessionAktion::Entfernen,
        ]
    }

    fn puffer_leeren(
        puffer: &mut Vec<IceCandidateInit>,
        ziel: ConnectionId,
    ) -> Vec<SessionAktion> {
        puffer
            .drain(..)
            .map(|kandidat| SessionAktion::Senden {
                an: ziel,
                signal: ServerSignal::IceCandidate { candidate: kandidat },
            })
            .collect()
    }

    fn ignorieren(&self, ereignis: &str, grund: &str) {
        tracing::debug!(
            session = %self.id,
            phase = ?self.phase,
            ereignis,
            grund,
            "Signal ausser der Reihe – ignoriert"
        );
    }
}

/// Vom Client gemeldeter ICE-Transportzustand (Session-Sicht)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMeldung {
    Verbunden,
    Getrennt,
    Fehlgeschlagen,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Signal-Nachrichten (Client <-> Server)
//!
//! Jede Nachricht wird als `{"event": "...", "data": {...}}` serialisiert;
//! die Event-Namen entsprechen dem bestehenden Browser-Client. Nachrichten
//! ohne Payload (z.B. `call-ended`) lassen das `data`-Feld weg.

use plausch_core::types::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payload-Typen
// ---------------------------------------------------------------------------

/// Medien-Art eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Video,
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// SDP-Beschreibung (Offer oder Answer)
///
/// Entspricht dem Browser-Typ `RTCSessionDescriptionInit`. Der Server
/// interpretiert den Inhalt nicht, er reicht ihn nur durch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" oder "answer"
    #[serde(rename = "type")]
    pub sdp_type: String,
    /// Die eigentliche Session-Beschreibung
    pub sdp: String,
}

impl SessionDescription {
    /// Erstellt ein Offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: "offer".into(),
            sdp: sdp.into(),
        }
    }

    /// Erstellt ein Answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: "answer".into(),
            sdp: sdp.into(),
        }
    }
}

/// ICE-Kandidat (Netzwerk-Pfad-Vorschlag)
///
/// Entspricht dem Browser-Typ `RTCIceCandidateInit`; wird unveraendert
/// zwischen den Peers weitergereicht oder serverseitig gepuffert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u32>,
}

/// ICE-Transportzustand, vom Client gemeldet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportState {
    Connected,
    Disconnected,
    Failed,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Alle Nachrichten die ein Client an den Server senden kann
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientSignal {
    /// Registriert den Anzeigenamen dieser Verbindung
    #[serde(rename = "setUsername")]
    SetUsername { name: String },

    /// Startet einen Anruf: Offer an den Zielbenutzer
    ///
    /// Waehrend einer laufenden Negotiation (ICE-Restart) transportiert
    /// dieselbe Nachricht das frische Offer.
    #[serde(rename = "call-user")]
    CallUser {
        to: String,
        offer: SessionDescription,
        #[serde(rename = "callType")]
        call_type: CallType,
    },

    /// Antwort des Angerufenen auf ein Offer
    #[serde(rename = "call-answer")]
    CallAnswer {
        to: String,
        answer: SessionDescription,
    },

    /// ICE-Kandidat fuer die Gegenstelle
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        to: String,
        candidate: IceCandidateInit,
    },

    /// Beendet den laufenden Anruf
    #[serde(rename = "end-call")]
    EndCall { to: String },

    /// Lehnt einen eingehenden Anruf ab
    #[serde(rename = "reject-call")]
    RejectCall { to: String },

    /// Meldet den ICE-Transportzustand der eigenen PeerConnection
    #[serde(rename = "connection-state")]
    ConnectionState { state: IceTransportState },
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Alle Nachrichten die der Server an einen Client senden kann
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerSignal {
    /// Aktuelle Liste aller registrierten Anzeigenamen
    #[serde(rename = "userList")]
    UserList { users: Vec<String> },

    /// Eingehender Anruf mit dem Offer des Anrufers
    #[serde(rename = "incoming-call")]
    IncomingCall {
        from: String,
        offer: SessionDescription,
        #[serde(rename = "callType")]
        call_type: CallType,
        #[serde(rename = "socketId")]
        socket_id: ConnectionId,
    },

    /// Answer des Angerufenen, an den Anrufer weitergereicht
    #[serde(rename = "call-answered")]
    CallAnswered { answer: SessionDescription },

    /// ICE-Kandidat der Gegenstelle
    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: IceCandidateInit },

    /// Der Anruf wurde beendet (Gegenstelle, Timeout oder ICE-Fehlschlag)
    #[serde(rename = "call-ended")]
    CallEnded,

    /// Der Angerufene hat den Anruf abgelehnt
    #[serde(rename = "call-rejected")]
    CallRejected,

    /// Das Anruf-Ziel ist bereits in einem Anruf
    #[serde(rename = "call-busy")]
    CallBusy,

    /// Aufforderung an den Anrufer, einen ICE-Restart durchzufuehren
    #[serde(rename = "restart-ice")]
    RestartIce { attempt: u32 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

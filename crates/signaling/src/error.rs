//! Fehlertypen fuer den Signaling-Service

use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
///
/// Alle Fehler sind lokal zur betroffenen Session; keiner ist fatal fuer
/// den Server-Prozess.
#[derive(Debug, Error)]
pub enum SignalFehler {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Der Anrufer ist bereits in einem nicht-terminalen Anruf
    #[error("Bereits in einem Anruf")]
    BereitsImAnruf,

    /// Das Anruf-Ziel ist bereits in einem nicht-terminalen Anruf
    #[error("Gegenstelle ist bereits in einem Anruf")]
    GegenstelleBeschaeftigt,

    /// Ziel-Benutzer ist nicht verbunden (Signal wird stillschweigend verworfen)
    #[error("Ziel nicht gefunden: {0}")]
    ZielNichtGefunden(String),

    /// Signal passt nicht zum Session-Zustand (z.B. Answer ohne Offer)
    #[error("Signal ausser der Reihe: {0}")]
    AusserDerReihe(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalFehler {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalResult<T> = Result<T, SignalFehler>;

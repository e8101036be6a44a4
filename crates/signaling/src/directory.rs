//! Benutzerverzeichnis – Anzeigename <-> Verbindung
//!
//! Haelt den ephemeren Zustand aller registrierten Anzeigenamen. Eintraege
//! entstehen beim `setUsername`-Signal und verschwinden beim Disconnect.
//! Anzeigenamen sind nicht garantiert eindeutig; bei Namensgleichheit
//! gewinnt die juengste Registrierung.

use dashmap::DashMap;
use plausch_core::types::ConnectionId;
use std::sync::Arc;

/// Verwaltet die Zuordnung von Anzeigenamen zu lebenden Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone des Verzeichnisses teilt den
/// inneren Zustand.
#[derive(Clone)]
pub struct UserDirectory {
    inner: Arc<UserDirectoryInner>,
}

struct UserDirectoryInner {
    /// Verbindung -> Anzeigename (hoechstens ein Name pro Verbindung)
    namen: DashMap<ConnectionId, String>,
    /// Anzeigename -> juengste Verbindung mit diesem Namen
    index: DashMap<String, ConnectionId>,
}

impl UserDirectory {
    /// Erstellt ein neues, leeres Verzeichnis
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(UserDirectoryInner {
                namen: DashMap::new(),
                index: DashMap::new(),
            }),
        }
    }

    /// Registriert oder ueberschreibt den Anzeigenamen einer Verbindung
    pub fn namen_setzen(&self, verbindung: ConnectionId, name: impl Into<String>) {
        let name = name.into();

        // Alten Namen dieser Verbindung aus dem Index entfernen,
        // sofern der Index-Eintrag noch auf diese Verbindung zeigt
        if let Some(alter_name) = self.inner.namen.get(&verbindung).map(|e| e.clone()) {
            if alter_name != name {
                self.inner
                    .index
                    .remove_if(&alter_name, |_, conn| *conn == verbindung);
            }
        }

        self.inner.namen.insert(verbindung, name.clone());
        self.inner.index.insert(name.clone(), verbindung);

        tracing::info!(verbindung = %verbindung, name = %name, "Anzeigename registriert");
    }

    /// Entfernt eine Verbindung aus dem Verzeichnis (Disconnect)
    pub fn verbindung_getrennt(&self, verbindung: &ConnectionId) {
        if let Some((_, name)) = self.inner.namen.remove(verbindung) {
            // Index nur bereinigen wenn er noch auf diese Verbindung zeigt –
            // eine juengere Registrierung desselben Namens bleibt erhalten
            self.inner
                .index
                .remove_if(&name, |_, conn| conn == verbindung);

            tracing::info!(verbindung = %verbindung, name = %name, "Anzeigename entfernt");
        }
    }

    /// Loest einen Anzeigenamen zur Verbindung auf
    ///
    /// Bei mehreren Verbindungen mit demselben Namen gewinnt die juengste
    /// Registrierung.
    pub fn aufloesen(&self, name: &str) -> Option<ConnectionId> {
        self.inner.index.get(name).map(|e| *e)
    }

    /// Gibt den Anzeigenamen einer Verbindung zurueck
    pub fn anzeigename(&self, verbindung: &ConnectionId) -> Option<String> {
        self.inner.namen.get(verbindung).map(|e| e.clone())
    }

    /// Gibt alle registrierten Anzeigenamen zurueck (fuer `userList`)
    pub fn benutzerliste(&self) -> Vec<String> {
        self.inner
            .namen
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    /// Prueft ob eine Verbindung registriert ist
    pub fn ist_registriert(&self, verbindung: &ConnectionId) -> bool {
        self.inner.namen.contains_key(verbindung)
    }

    /// Gibt die Anzahl der registrierten Namen zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.namen.len()
    }
}

impl Default for UserDirectory {
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

    #[test]
    fn registrieren_und_aufloesen() {
        let verzeichnis = UserDirectory::neu();
        let conn = ConnectionId::new();

        verzeichnis.namen_setzen(conn, "alice");
        assert_eq!(verzeichnis.aufloesen("alice"), Some(conn));
        assert_eq!(verzeichnis.anzeigename(&conn).as_deref(), Some("alice"));
        assert_eq!(verzeichnis.anzahl(), 1);
    }

    #[test]
    fn juengste_registrierung_gewinnt() {
        let verzeichnis = UserDirectory::neu();
        let alt = ConnectionId::new();
        let neu = ConnectionId::new();

        verzeichnis.namen_setzen(alt, "alice");
        verzeichnis.namen_setzen(neu, "alice");

        assert_eq!(verzeichnis.aufloesen("alice"), Some(neu));
    }

    #[test]
    fn disconnect_entfernt_eintrag() {
        let verzeichnis = UserDirectory::neu();
        let conn = ConnectionId::new();

        verzeichnis.namen_setzen(conn, "bob");
        verzeichnis.verbindung_getrennt(&conn);

        assert_eq!(verzeichnis.aufloesen("bob"), None);
        assert!(!verzeichnis.ist_registriert(&conn));
    }

    #[test]
    fn disconnect_der_alten_verbindung_laesst_neue_registrierung_intakt() {
        let verzeichnis = UserDirectory::neu();
        let alt = ConnectionId::new();
        let neu = ConnectionId::new();

        verzeichnis.namen_setzen(alt, "alice");
        verzeichnis.namen_setzen(neu, "alice");
        verzeichnis.verbindung_getrennt(&alt);

        // Die juengere Registrierung darf nicht verloren gehen
        assert_eq!(verzeichnis.aufloesen("alice"), Some(neu));
    }

    #[test]
    fn namenswechsel_bereinigt_alten_index() {
        let verzeichnis = UserDirectory::neu();
        let conn = ConnectionId::new();

        verzeichnis.namen_setzen(conn, "alice");
        verzeichnis.namen_setzen(conn, "alicia");

        assert_eq!(verzeichnis.aufloesen("alice"), None);
        assert_eq!(verzeichnis.aufloesen("alicia"), Some(conn));
        assert_eq!(verzeichnis.anzahl(), 1);
    }

    #[test]
    fn benutzerliste_enthaelt_alle_namen() {
        let verzeichnis = UserDirectory::neu();
        verzeichnis.namen_setzen(ConnectionId::new(), "alice");
        verzeichnis.namen_setzen(ConnectionId::new(), "bob");

        let mut liste = verzeichnis.benutzerliste();
        liste.sort();
        assert_eq!(liste, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn clone_teilt_inneren_state() {
        let v1 = UserDirectory::neu();
        let v2 = v1.clone();
        let conn = ConnectionId::new();

        v1.namen_setzen(conn, "shared");
        assert_eq!(v2.aufloesen("shared"), Some(conn));
    }
}

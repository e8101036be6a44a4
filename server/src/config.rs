//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use plausch_signaling::AnrufRegeln;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Anruf-Einstellungen (Timeouts, ICE-Wiederholungen)
    pub anruf: AnrufEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Plausch Server".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer die TCP-Verbindung (Signaling-Protokoll)
    pub bind_adresse: String,
    /// Port fuer die TCP-Verbindung
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 5000,
        }
    }
}

/// Anruf-Einstellungen (Timeouts und ICE-Wiederholungen)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnrufEinstellungen {
    /// Deadline fuer den Anruf-Aufbau in Sekunden
    pub deadline_sek: u64,
    /// Karenzzeit nach Transport-Abbruch in Sekunden
    pub grace_sek: u64,
    /// Maximale Anzahl von ICE-Restart-Versuchen
    pub max_ice_versuche: u32,
    /// Wartezeit vor einem ICE-Restart in Millisekunden
    pub restart_backoff_ms: u64,
}

impl Default for AnrufEinstellungen {
    fn default() -> Self {
        Self {
            deadline_sek: 30,
            grace_sek: 10,
            max_ice_versuche: 3,
            restart_backoff_ms: 1000,
        }
    }
}

impl AnrufEinstellungen {
    /// Uebersetzt die Einstellungen in die Regeln der Session-Maschine
    pub fn als_regeln(&self) -> AnrufRegeln {
        AnrufRegeln {
            deadline: Duration::from_secs(self.deadline_sek),
            grace: Duration::from_secs(self.grace_sek),
            restart_backoff: Duration::from_millis(self.restart_backoff_ms),
            max_versuche: self.max_ice_versuche,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.netzwerk.tcp_port, 5000);
        assert_eq!(cfg.anruf.deadline_sek, 30);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse(), "0.0.0.0:5000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Server"
            max_clients = 100

            [netzwerk]
            tcp_port = 6000

            [anruf]
            deadline_sek = 15
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Server");
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.netzwerk.tcp_port, 6000);
        assert_eq!(cfg.anruf.deadline_sek, 15);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.anruf.grace_sek, 10);
        assert_eq!(cfg.anruf.max_ice_versuche, 3);
    }

    #[test]
    fn anruf_einstellungen_als_regeln() {
        let regeln = AnrufEinstellungen::default().als_regeln();
        assert_eq!(regeln.deadline, Duration::from_secs(30));
        assert_eq!(regeln.grace, Duration::from_secs(10));
        assert_eq!(regeln.restart_backoff, Duration::from_millis(1000));
        assert_eq!(regeln.max_versuche, 3);
    }
}

//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 256 KB – SDP-Offers
//! und ICE-Kandidaten bleiben weit darunter).

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

use crate::signal::{ClientSignal, ServerSignal};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (256 KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// SignalCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte Signal-Verbindungen
///
/// Generisch ueber die ein- und ausgehende Nachrichtenrichtung, damit
/// Server und Client denselben Codec mit vertauschten Typen verwenden
/// koennen (siehe [`ServerCodec`] und [`ClientCodec`]).
#[derive(Debug)]
pub struct SignalCodec<Eingehend, Ausgehend> {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
    _richtung: PhantomData<fn(Ausgehend) -> Eingehend>,
}

/// Codec fuer die Server-Seite: dekodiert [`ClientSignal`], kodiert [`ServerSignal`]
pub type ServerCodec = SignalCodec<ClientSignal, ServerSignal>;

/// Codec fuer die Client-Seite (Tests, Tools): dekodiert [`ServerSignal`]
pub type ClientCodec = SignalCodec<ServerSignal, ClientSignal>;

impl<E, A> SignalCodec<E, A> {
    /// Erstellt einen neuen Codec mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            _richtung: PhantomData,
        }
    }

    /// Erstellt einen Codec mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _richtung: PhantomData,
        }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<E, A> Default for SignalCodec<E, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, A> Clone for SignalCodec<E, A> {
    fn clone(&self) -> Self {
        Self {
            max_frame_size: self.max_frame_size,
            _richtung: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl<E, A> Decoder for SignalCodec<E, A>
where
    E: DeserializeOwned,
{
    type Item = E;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen (big-endian u32) ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        // Maximale Frame-Groesse pruefen
        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_size
                ),
            ));
        }

        // Pruefen ob der vollstaendige Frame bereits im Buffer ist
        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        // Laengen-Feld verbrauchen
        src.advance(LENGTH_FIELD_SIZE);

        // Payload-Bytes extrahieren
        let payload = src.split_to(length);

        // JSON deserialisieren
        let message: E = serde_json::from_slice(&payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
            )
        })?;

        Ok(Some(message))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<E, A> Encoder<A> for SignalCodec<E, A>
where
    A: Serialize,
{
    type Error = io::Error;

    fn encode(&mut self, item: A, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // JSON serialisieren
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        // Groesse pruefen
        if json.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    json.len(),
                    self.max_frame_size
                ),
            ));
        }

        // Laengen-Feld + Payload schreiben
        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(name: &str) -> ClientSignal {
        ClientSignal::SetUsername { name: name.into() }
    }

    #[test]
    fn codec_encode_decode_round_trip() {
        let mut encoder: ClientCodec = SignalCodec::new();
        let mut decoder: ServerCodec = SignalCodec::new();
        let original = test_signal("alice");

        // Kodieren (Client-Seite)
        let mut buf = BytesMut::new();
        encoder.encode(original.clone(), &mut buf).unwrap();

        // Laengen-Feld pruefen
        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert!(payload_len > 0);
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);

        // Dekodieren (Server-Seite)
        let decoded = decoder
            .decode(&mut buf)
            .unwrap()
            .expect("Muss eine Nachricht enthalten");
        assert_eq!(decoded, original);
    }

    #[test]
    fn codec_unvollstaendiger_frame() {
        let mut encoder: ClientCodec = SignalCodec::new();
        let mut decoder: ServerCodec = SignalCodec::new();

        let mut buf = BytesMut::new();
        encoder.encode(test_signal("bob"), &mut buf).unwrap();

        // Nur die Haelfte der Bytes behalten
        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);

        // Sollte None zurueckgeben (wartet auf mehr Daten)
        let result = decoder.decode(&mut partial).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn codec_zu_wenig_bytes_fuer_laengenfeld() {
        let mut decoder: ServerCodec = SignalCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        let result = decoder.decode(&mut buf).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn codec_ablehnung_zu_grosser_frame() {
        let mut decoder: ServerCodec = SignalCodec::with_max_size(100);

        // Frame-Laenge von 200 Bytes im Buffer simulieren
        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);

        let result = decoder.decode(&mut buf);
        assert!(result.is_err());
    }

    #[test]
    fn codec_ablehnung_beim_encode_zu_grosse_nachricht() {
        let mut encoder: ClientCodec = SignalCodec::with_max_size(10);
        let original = test_signal("x"); // JSON ist sicher > 10 Bytes

        let mut buf = BytesMut::new();
        let result = encoder.encode(original, &mut buf);
        assert!(result.is_err());
    }

    #[test]
    fn codec_mehrere_nachrichten_im_buffer() {
        let mut encoder: ClientCodec = SignalCodec::new();
        let mut decoder: ServerCodec = SignalCodec::new();
        let mut buf = BytesMut::new();

        // Drei Nachrichten kodieren
        let namen = ["a", "b", "c"];
        for name in namen {
            encoder.encode(test_signal(name), &mut buf).unwrap();
        }

        // Alle drei dekodieren
        for name in namen {
            let msg = decoder.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg, test_signal(name));
        }

        // Buffer muss leer sein
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_default_max_size() {
        let codec: ServerCodec = SignalCodec::new();
        assert_eq!(codec.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn server_codec_kodiert_server_signale() {
        let mut encoder: ServerCodec = SignalCodec::new();
        let mut decoder: ClientCodec = SignalCodec::new();

        let mut buf = BytesMut::new();
        encoder.encode(ServerSignal::CallRejected, &mut buf).unwrap();

        let decoded = decoder.decode(&mut buf).unwrap().expect("Nachricht erwartet");
        assert_eq!(decoded, ServerSignal::CallRejected);
    }
}

//! oganesson-session — stream framing and encrypted sessions for the
//! Oganesson messaging framework.
//!
//! [`PacketSession`] moves arbitrary payloads over any `AsyncRead +
//! AsyncWrite` stream; [`OgServer`] and [`OgClient`] add the key-exchange
//! handshake and per-message key rotation on top.

pub mod packet;
pub mod session;

pub use packet::{PacketSession, SessionConfig, DEFAULT_MAX_PACKET_SIZE, DEFAULT_TIMEOUT};
pub use session::{send_wire_error, OgClient, OgServer};

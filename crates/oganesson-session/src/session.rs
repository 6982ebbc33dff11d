//! Encrypted Oganesson sessions.
//!
//! A four-turn handshake delivers a symmetric session key to the client
//! inside a sealed box, after which every payload travels in an encrypted
//! `OgMsg` envelope. Each data message announces the key for the next one,
//! so key material rotates forward with the traffic:
//!
//! ```text
//! C → S  SessionSetup
//! S → C  SessionSetup  {Session: "og"}
//! C → S  SessionKey    {PublicKey, Fingerprint}
//! S → C  SessionKey    {SessionKey: "CURVE25519:" ‖ sealed{SecretKey, Fingerprint}}
//! ```
//!
//! A writer rotates to the key it announced right after a successful
//! write; a reader rotates to the received key right after a successful
//! read. Both paths take `&mut self`, so a session object walks a single
//! key chain and the peers stay in step.

use rand::{Rng, RngCore};
use tokio::io::{AsyncRead, AsyncWrite};

use oganesson_core::crypto::{
    EncryptionPair, PublicEncryptionKey, SecretKey, PUBLIC_KEY_PREFIX,
};
use oganesson_core::error::{OgError, Result};
use oganesson_core::field::FieldType;
use oganesson_core::value::Value;
use oganesson_core::wiremsg::WireMsg;

use crate::packet::{PacketSession, SessionConfig};

// Handshake message codes.
const MSG_SESSION_SETUP: &str = "SessionSetup";
const MSG_SESSION_KEY: &str = "SessionKey";

// Data-phase message codes.
const MSG_OG: &str = "OgMsg";
const MSG_ENC: &str = "EncMsg";

// Attachment names.
const ATT_SESSION: &str = "Session";
const ATT_ERROR: &str = "Error";
const ATT_PUBLIC_KEY: &str = "PublicKey";
const ATT_FINGERPRINT: &str = "Fingerprint";
const ATT_SESSION_KEY: &str = "SessionKey";
const ATT_SECRET_KEY: &str = "SecretKey";
const ATT_PAYLOAD: &str = "Payload";
const ATT_DATA: &str = "Data";
const ATT_PADDING: &str = "Padding";
const ATT_NEXT_KEY: &str = "NextKey";

/// Session kind announced during setup. Encrypted, no identity checking
/// beyond fingerprint transport.
const SESSION_KIND: &str = "og";

/// Send an error response on a session: `msg_code` with an `Error`
/// attachment naming the stable error identifier.
pub async fn send_wire_error<S>(
    session: &mut PacketSession<S>,
    msg_code: &str,
    error: &OgError,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if msg_code.is_empty() {
        return Err(OgError::EmptyData);
    }
    let mut msg = WireMsg::new(msg_code);
    msg.add_field_as(
        ATT_ERROR,
        FieldType::String,
        &Value::String(error.code().to_string()),
    )?;
    session.write_message(&msg).await
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Server side of an encrypted Oganesson session.
pub struct OgServer<S> {
    session: PacketSession<S>,
    key: Option<SecretKey>,
    fingerprint: String,
    peer_fingerprint: Option<String>,
}

impl<S> OgServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, fingerprint: impl Into<String>) -> OgServer<S> {
        OgServer::with_config(stream, SessionConfig::default(), fingerprint)
    }

    pub fn with_config(
        stream: S,
        config: SessionConfig,
        fingerprint: impl Into<String>,
    ) -> OgServer<S> {
        OgServer {
            session: PacketSession::with_config(stream, config),
            key: None,
            fingerprint: fingerprint.into(),
            peer_fingerprint: None,
        }
    }

    /// Run the server side of the handshake.
    ///
    /// On a protocol violation the peer is notified once, best-effort,
    /// with an `Error` attachment before the call returns
    /// `ErrSessionSetup`.
    pub async fn setup(&mut self) -> Result<()> {
        // The client must open with a session-type request; anything else
        // is a protocol violation.
        let msg = self.session.read_message().await?;
        if msg.code != MSG_SESSION_SETUP {
            tracing::debug!(code = %msg.code, "expected session setup request");
            self.notify_error(&OgError::SessionSetup).await;
            return Err(OgError::SessionSetup);
        }

        let mut reply = WireMsg::new(MSG_SESSION_SETUP);
        reply.add_field_as(
            ATT_SESSION,
            FieldType::String,
            &Value::String(SESSION_KIND.to_string()),
        )?;
        self.session.write_message(&reply).await?;

        // An og session is encrypted but does no identity checking: the
        // client sends an ephemeral public key and we seal a fresh session
        // key to it.
        let msg = self.session.read_message().await?;
        if msg.code != MSG_SESSION_KEY || !msg.has_field(ATT_PUBLIC_KEY) {
            self.notify_error(&OgError::ProtocolError).await;
            return Err(OgError::SessionSetup);
        }

        let client_public = match msg
            .get_string_field(ATT_PUBLIC_KEY)
            .and_then(|text| PublicEncryptionKey::from_text(&text).ok())
        {
            Some(key) => key,
            None => {
                self.notify_error(&OgError::BadSessionKey).await;
                return Err(OgError::SessionSetup);
            }
        };
        self.peer_fingerprint = msg.get_string_field(ATT_FINGERPRINT);

        let session_key = SecretKey::generate();
        let mut inner = WireMsg::new(MSG_SESSION_KEY);
        inner.add_field_as(
            ATT_SECRET_KEY,
            FieldType::String,
            &Value::String(session_key.as_text()),
        )?;
        inner.add_field_as(
            ATT_FINGERPRINT,
            FieldType::String,
            &Value::String(self.fingerprint.clone()),
        )?;

        let sealed = match inner.flatten().and_then(|flat| client_public.seal(&flat)) {
            Ok(sealed) => sealed,
            Err(err) => {
                self.notify_error(&OgError::ServerError).await;
                return Err(err);
            }
        };

        // The attachment is binary: the key-algorithm prefix, a colon,
        // then the sealed box.
        let mut payload = Vec::with_capacity(PUBLIC_KEY_PREFIX.len() + 1 + sealed.len());
        payload.extend_from_slice(PUBLIC_KEY_PREFIX.as_bytes());
        payload.push(b':');
        payload.extend_from_slice(&sealed);

        let mut outer = WireMsg::new(MSG_SESSION_KEY);
        outer.add_field_as(ATT_SESSION_KEY, FieldType::Bytes, &Value::Bytes(payload))?;
        self.session.write_message(&outer).await?;

        self.key = Some(session_key);
        tracing::info!("og session established (server)");
        Ok(())
    }

    /// Read one decrypted payload, rotating to the announced next key.
    pub async fn read_data(&mut self) -> Result<Vec<u8>> {
        let key = self.key.clone().ok_or(OgError::SessionSetup)?;
        let (data, next) = read_data_msg(&mut self.session, &key).await?;
        self.key = Some(next);
        Ok(data)
    }

    /// Encrypt and send one payload, rotating to a fresh key afterwards.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        let key = self.key.clone().ok_or(OgError::SessionSetup)?;
        let (sent, next) = write_data_msg(&mut self.session, &key, data).await?;
        self.key = Some(next);
        Ok(sent)
    }

    /// The session key currently in effect. `None` before setup.
    pub fn current_key(&self) -> Option<&SecretKey> {
        self.key.as_ref()
    }

    /// The fingerprint the client sent during setup, if any.
    pub fn peer_fingerprint(&self) -> Option<&str> {
        self.peer_fingerprint.as_deref()
    }

    async fn notify_error(&mut self, error: &OgError) {
        if let Err(err) = send_wire_error(&mut self.session, MSG_SESSION_SETUP, error).await {
            tracing::warn!(error = %err, "failed to notify peer of handshake failure");
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Client side of an encrypted Oganesson session.
pub struct OgClient<S> {
    session: PacketSession<S>,
    key: Option<SecretKey>,
    fingerprint: String,
    expected_peer: Option<String>,
    peer_fingerprint: Option<String>,
}

impl<S> OgClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `expected_peer` is the server fingerprint to insist on; `None`
    /// accepts any peer.
    pub fn new(
        stream: S,
        fingerprint: impl Into<String>,
        expected_peer: Option<String>,
    ) -> OgClient<S> {
        OgClient::with_config(stream, SessionConfig::default(), fingerprint, expected_peer)
    }

    pub fn with_config(
        stream: S,
        config: SessionConfig,
        fingerprint: impl Into<String>,
        expected_peer: Option<String>,
    ) -> OgClient<S> {
        OgClient {
            session: PacketSession::with_config(stream, config),
            key: None,
            fingerprint: fingerprint.into(),
            expected_peer,
            peer_fingerprint: None,
        }
    }

    /// Run the client side of the handshake.
    pub async fn setup(&mut self) -> Result<()> {
        self.session
            .write_message(&WireMsg::new(MSG_SESSION_SETUP))
            .await?;

        let reply = self.session.read_message().await?;
        if let Some(code) = reply.get_string_field(ATT_ERROR) {
            return Err(OgError::from_code(&code).unwrap_or(OgError::ServerError));
        }
        if reply.code != MSG_SESSION_SETUP
            || reply.get_string_field(ATT_SESSION).as_deref() != Some(SESSION_KIND)
        {
            return Err(OgError::SessionSetup);
        }

        // Ephemeral keypair for this handshake only; the server seals the
        // session key to it.
        let pair = EncryptionPair::generate();
        let mut msg = WireMsg::new(MSG_SESSION_KEY);
        msg.add_field_as(
            ATT_PUBLIC_KEY,
            FieldType::String,
            &Value::String(pair.public_text()),
        )?;
        if !self.fingerprint.is_empty() {
            msg.add_field_as(
                ATT_FINGERPRINT,
                FieldType::String,
                &Value::String(self.fingerprint.clone()),
            )?;
        }
        self.session.write_message(&msg).await?;

        let reply = self.session.read_message().await?;
        if let Some(code) = reply.get_string_field(ATT_ERROR) {
            return Err(OgError::from_code(&code).unwrap_or(OgError::ServerError));
        }
        if reply.code != MSG_SESSION_KEY {
            return Err(OgError::SessionSetup);
        }
        let sealed = match reply.get_field(ATT_SESSION_KEY) {
            Ok((FieldType::Bytes, Value::Bytes(bytes))) => bytes,
            _ => return Err(OgError::SessionSetup),
        };

        // Strip the "<prefix>:" framing and open the sealed box.
        let sep = sealed
            .iter()
            .position(|&b| b == b':')
            .ok_or(OgError::BadSessionKey)?;
        let prefix = std::str::from_utf8(&sealed[..sep]).map_err(|_| OgError::BadSessionKey)?;
        if prefix != PUBLIC_KEY_PREFIX {
            return Err(OgError::BadSessionKey);
        }
        let inner_bytes = pair
            .open(&sealed[sep + 1..])
            .map_err(|_| OgError::SessionSetup)?;

        let inner = WireMsg::unflatten(&inner_bytes)?;
        if inner.code != MSG_SESSION_KEY {
            return Err(OgError::SessionSetup);
        }
        let key_text = inner
            .get_string_field(ATT_SECRET_KEY)
            .ok_or(OgError::SessionSetup)?;
        let key = SecretKey::from_text(&key_text).map_err(|_| OgError::SessionSetup)?;

        self.peer_fingerprint = inner.get_string_field(ATT_FINGERPRINT);
        if let Some(expected) = &self.expected_peer {
            if self.peer_fingerprint.as_deref() != Some(expected.as_str()) {
                tracing::warn!("server fingerprint does not match the expected identity");
                return Err(OgError::SessionMismatch);
            }
        }

        self.key = Some(key);
        tracing::info!("og session established (client)");
        Ok(())
    }

    /// Read one decrypted payload, rotating to the announced next key.
    pub async fn read_data(&mut self) -> Result<Vec<u8>> {
        let key = self.key.clone().ok_or(OgError::SessionSetup)?;
        let (data, next) = read_data_msg(&mut self.session, &key).await?;
        self.key = Some(next);
        Ok(data)
    }

    /// Encrypt and send one payload, rotating to a fresh key afterwards.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<usize> {
        let key = self.key.clone().ok_or(OgError::SessionSetup)?;
        let (sent, next) = write_data_msg(&mut self.session, &key, data).await?;
        self.key = Some(next);
        Ok(sent)
    }

    /// The session key currently in effect. `None` before setup.
    pub fn current_key(&self) -> Option<&SecretKey> {
        self.key.as_ref()
    }

    /// The fingerprint the server delivered inside the sealed box.
    pub fn peer_fingerprint(&self) -> Option<&str> {
        self.peer_fingerprint.as_deref()
    }
}

// ── Data phase ────────────────────────────────────────────────────────────────

/// Build, encrypt, and send one data message. Returns the bytes sent and
/// the key announced for the next message.
async fn write_data_msg<S>(
    session: &mut PacketSession<S>,
    key: &SecretKey,
    data: &[u8],
) -> Result<(usize, SecretKey)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if data.is_empty() {
        return Err(OgError::EmptyData);
    }

    let next = SecretKey::generate();

    // Random length padding blurs the correlation between payload sizes
    // and envelope sizes.
    let padding = {
        let mut rng = rand::thread_rng();
        let mut padding = vec![0u8; rng.gen_range(1..=16)];
        rng.fill_bytes(&mut padding);
        padding
    };

    let mut inner = WireMsg::new(MSG_ENC);
    inner.add_field_as(ATT_DATA, FieldType::Bytes, &Value::Bytes(data.to_vec()))?;
    inner.add_field_as(
        ATT_PADDING,
        FieldType::String,
        &Value::String(hex::encode(&padding)),
    )?;
    inner.add_field_as(
        ATT_NEXT_KEY,
        FieldType::String,
        &Value::String(next.as_text()),
    )?;

    let envelope = key.encrypt(&inner.flatten()?)?;
    let mut outer = WireMsg::new(MSG_OG);
    outer.add_field_as(ATT_PAYLOAD, FieldType::Bytes, &Value::Bytes(envelope))?;

    let sent = session.write_message(&outer).await?;
    Ok((sent, next))
}

/// Receive and decrypt one data message. Returns the payload and the key
/// the peer announced for the next message.
async fn read_data_msg<S>(
    session: &mut PacketSession<S>,
    key: &SecretKey,
) -> Result<(Vec<u8>, SecretKey)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outer = session.read_message().await?;
    if outer.code != MSG_OG {
        return Err(OgError::InvalidMsg);
    }
    let envelope = match outer.get_field(ATT_PAYLOAD) {
        Ok((FieldType::Bytes, Value::Bytes(bytes))) => bytes,
        _ => return Err(OgError::InvalidMsg),
    };

    let plain = key.decrypt(&envelope)?;
    let inner = WireMsg::unflatten(&plain)?;
    if inner.code != MSG_ENC {
        return Err(OgError::InvalidMsg);
    }
    let data = match inner.get_field(ATT_DATA) {
        Ok((FieldType::Bytes, Value::Bytes(bytes))) => bytes,
        _ => return Err(OgError::InvalidMsg),
    };
    let next_text = inner
        .get_string_field(ATT_NEXT_KEY)
        .ok_or(OgError::InvalidMsg)?;
    let next = SecretKey::from_text(&next_text)?;

    Ok((data, next))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

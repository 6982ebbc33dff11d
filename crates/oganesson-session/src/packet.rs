//! Packet session — delivers one logical payload per call over a byte
//! stream, fragmenting into multipart sequences when the payload exceeds
//! the packet size and reassembling on the read side.
//!
//! Small payloads travel as one `singlepacket` unit. Anything larger is a
//! `multipartpacket` header announcing the total length, a run of full
//! `multipart` chunks, and one `multipartfinal` chunk with the remainder.
//! Reassembly is bit-exact: the bytes handed to `write_packet` are the
//! bytes `read_packet` returns at the peer.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use oganesson_core::error::{OgError, Result};
use oganesson_core::field::{DataField, FieldType, MAX_VALUE_LEN, UNIT_OVERHEAD};
use oganesson_core::value::Value;
use oganesson_core::wiremsg::WireMsg;

/// Default packet size ceiling, headers included.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16384;

/// Default per-call stream deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs for one packet session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest unit the session will put on the wire, including the
    /// 3-byte unit header. Payloads under `max_packet_size - 3` go out as
    /// a single packet; everything else is fragmented.
    pub max_packet_size: usize,

    /// Deadline applied to every individual stream read and write. On
    /// expiry the call fails with a network error and the session should
    /// be closed; there is no partial-read recovery.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Frames and unframes logical payloads over a bidirectional byte stream.
///
/// One session wraps one connection and lives as long as it does. The
/// read-side reassembler is sequential: multipart transfers cannot
/// interleave on a single stream.
pub struct PacketSession<S> {
    stream: S,
    config: SessionConfig,
}

impl<S> PacketSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> PacketSession<S> {
        PacketSession {
            stream,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(stream: S, config: SessionConfig) -> PacketSession<S> {
        PacketSession { stream, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Adjust the per-call deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Give the underlying stream back, consuming the session.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Value bytes that fit in one unit alongside its header.
    fn chunk_size(&self) -> usize {
        self.config
            .max_packet_size
            .saturating_sub(UNIT_OVERHEAD)
            .clamp(1, MAX_VALUE_LEN)
    }

    // ── Write path ────────────────────────────────────────────────────────────

    /// Send one logical payload, fragmenting if needed.
    ///
    /// Returns the total bytes put on the wire, unit headers included.
    pub async fn write_packet(&mut self, packet: &[u8]) -> Result<usize> {
        if packet.is_empty() {
            return Err(OgError::EmptyData);
        }

        let chunk_size = self.chunk_size();
        if packet.len() < chunk_size {
            let field = DataField::new(FieldType::SinglePacket, &Value::Bytes(packet.to_vec()))?;
            let sent = self.write_field(&field).await?;
            self.flush().await?;
            return Ok(sent);
        }

        // The header announces the exact total so the reader can verify
        // the reassembled length.
        let header = DataField::new(
            FieldType::MultipartPacket,
            &Value::UInt64(packet.len() as u64),
        )?;
        let mut sent = self.write_field(&header).await?;

        let mut index = 0;
        while packet.len() - index > chunk_size {
            let chunk = DataField::new(
                FieldType::Multipart,
                &Value::Bytes(packet[index..index + chunk_size].to_vec()),
            )?;
            sent += self.write_field(&chunk).await?;
            index += chunk_size;
        }

        let fin = DataField::new(
            FieldType::MultipartFinal,
            &Value::Bytes(packet[index..].to_vec()),
        )?;
        sent += self.write_field(&fin).await?;
        self.flush().await?;

        tracing::debug!(total = packet.len(), sent, "multipart packet sent");
        Ok(sent)
    }

    // ── Read path ─────────────────────────────────────────────────────────────

    /// Receive one logical payload.
    ///
    /// Returns a `singlepacket` field whose value is the payload — either
    /// the unit read off the wire or the reassembled multipart transfer.
    pub async fn read_packet(&mut self) -> Result<DataField> {
        let field = self.read_field().await?;
        match field.field_type() {
            FieldType::SinglePacket => Ok(field),
            FieldType::Multipart | FieldType::MultipartFinal => Err(OgError::MultipartSession),
            FieldType::MultipartPacket => self.read_multipart(&field).await,
            _ => Err(OgError::InvalidMsg),
        }
    }

    /// Collect `multipart` chunks until the final one, then check the
    /// total against the announced length.
    async fn read_multipart(&mut self, header: &DataField) -> Result<DataField> {
        let total = match header.get()? {
            Value::UInt64(n) => n as usize,
            _ => return Err(OgError::BadData),
        };

        // The announced total is untrusted; reserve incrementally.
        let mut assembled = BytesMut::with_capacity(total.min(DEFAULT_MAX_PACKET_SIZE));
        loop {
            let part = self.read_field().await?;
            match part.field_type() {
                FieldType::Multipart => assembled.extend_from_slice(part.raw_value()),
                FieldType::MultipartFinal => {
                    assembled.extend_from_slice(part.raw_value());
                    break;
                }
                _ => return Err(OgError::BadType),
            }
        }

        if assembled.len() != total {
            return Err(OgError::Size);
        }
        tracing::debug!(total, "multipart packet reassembled");
        Ok(DataField::assembled_packet(assembled.to_vec()))
    }

    // ── Wire messages ─────────────────────────────────────────────────────────

    /// Read one wire message: exactly one packet, unflattened.
    pub async fn read_message(&mut self) -> Result<WireMsg> {
        let packet = self.read_packet().await?;
        WireMsg::unflatten(packet.raw_value())
    }

    /// Write one wire message as exactly one packet.
    pub async fn write_message(&mut self, msg: &WireMsg) -> Result<usize> {
        if msg.code.is_empty() {
            return Err(OgError::EmptyData);
        }
        self.write_packet(&msg.flatten()?).await
    }

    // ── Stream plumbing ───────────────────────────────────────────────────────

    async fn write_field(&mut self, field: &DataField) -> Result<usize> {
        let flat = field.flatten();
        timeout(self.config.timeout, self.stream.write_all(&flat))
            .await
            .map_err(|_| OgError::Network)??;
        Ok(flat.len())
    }

    async fn flush(&mut self) -> Result<()> {
        timeout(self.config.timeout, self.stream.flush())
            .await
            .map_err(|_| OgError::Network)??;
        Ok(())
    }

    /// Read one field unit: 3-byte header, then exactly the declared
    /// payload. Validated by the codec before use.
    async fn read_field(&mut self) -> Result<DataField> {
        let mut unit = vec![0u8; UNIT_OVERHEAD];
        timeout(self.config.timeout, self.stream.read_exact(&mut unit))
            .await
            .map_err(|_| OgError::Network)??;

        if FieldType::from_code(unit[0]).is_none() {
            return Err(OgError::BadType);
        }
        let length = u16::from_be_bytes([unit[1], unit[2]]) as usize;
        unit.resize(UNIT_OVERHEAD + length, 0);
        if length > 0 {
            timeout(
                self.config.timeout,
                self.stream.read_exact(&mut unit[UNIT_OVERHEAD..]),
            )
            .await
            .map_err(|_| OgError::Network)??;
        }

        DataField::unflatten(&unit)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

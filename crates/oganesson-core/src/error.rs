//! Protocol errors shared by every Oganesson layer.
//!
//! Each variant carries a stable textual identifier that is identical in
//! every Oganesson implementation regardless of language. The identifiers
//! travel on the wire inside handshake `Error` attachments, so `code()`
//! and `from_code()` must stay in sync.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OgError>;

/// Every failure the framework can report.
///
/// Three classes: caller errors (`BadType`, `BadValue`, `OutOfRange`,
/// `EmptyData`, `NotFound`) have no side effects; wire errors (`BadData`,
/// `Size`, `InvalidMsg`, `MultipartSession`) mean the current packet is
/// lost and the session should be torn down; transport errors (`Network`,
/// `Io`) mean the session is unusable.
#[derive(Debug, Error)]
pub enum OgError {
    #[error("unknown or mismatched field type")]
    BadType,

    #[error("value does not fit the field type")]
    BadValue,

    #[error("malformed wire data")]
    BadData,

    #[error("integer value out of range for the field width")]
    OutOfRange,

    #[error("size mismatch between declared and actual length")]
    Size,

    #[error("empty data where content is required")]
    EmptyData,

    #[error("field not found")]
    NotFound,

    #[error("network failure")]
    Network,

    #[error("network failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("multipart chunk received outside a multipart transfer")]
    MultipartSession,

    #[error("unexpected message for the current protocol state")]
    InvalidMsg,

    #[error("session setup failed")]
    SessionSetup,

    #[error("peer fingerprint does not match the expected identity")]
    SessionMismatch,

    #[error("key parse or decryption failure")]
    KeyError,

    #[error("client-side protocol failure")]
    ClientError,

    #[error("server-side protocol failure")]
    ServerError,

    #[error("protocol violation")]
    ProtocolError,

    #[error("invalid session key")]
    BadSessionKey,
}

impl OgError {
    /// The stable wire identifier for this error.
    pub fn code(&self) -> &'static str {
        match self {
            OgError::BadType => "ErrBadType",
            OgError::BadValue => "ErrBadValue",
            OgError::BadData => "ErrBadData",
            OgError::OutOfRange => "ErrOutOfRange",
            OgError::Size => "ErrSize",
            OgError::EmptyData => "ErrEmptyData",
            OgError::NotFound => "ErrNotFound",
            OgError::Network | OgError::Io(_) => "ErrNetworkError",
            OgError::MultipartSession => "ErrMultipartSession",
            OgError::InvalidMsg => "ErrInvalidMsg",
            OgError::SessionSetup => "ErrSessionSetup",
            OgError::SessionMismatch => "ErrSessionMismatch",
            OgError::KeyError => "ErrKeyError",
            OgError::ClientError => "ErrClientError",
            OgError::ServerError => "ErrServerError",
            OgError::ProtocolError => "ErrProtocolError",
            OgError::BadSessionKey => "ErrBadSessionKey",
        }
    }

    /// Recover an error from a peer-supplied wire identifier.
    ///
    /// `Io` is never produced; a peer can only name the generic `Network`
    /// condition.
    pub fn from_code(code: &str) -> Option<OgError> {
        match code {
            "ErrBadType" => Some(OgError::BadType),
            "ErrBadValue" => Some(OgError::BadValue),
            "ErrBadData" => Some(OgError::BadData),
            "ErrOutOfRange" => Some(OgError::OutOfRange),
            "ErrSize" => Some(OgError::Size),
            "ErrEmptyData" => Some(OgError::EmptyData),
            "ErrNotFound" => Some(OgError::NotFound),
            "ErrNetworkError" => Some(OgError::Network),
            "ErrMultipartSession" => Some(OgError::MultipartSession),
            "ErrInvalidMsg" => Some(OgError::InvalidMsg),
            "ErrSessionSetup" => Some(OgError::SessionSetup),
            "ErrSessionMismatch" => Some(OgError::SessionMismatch),
            "ErrKeyError" => Some(OgError::KeyError),
            "ErrClientError" => Some(OgError::ClientError),
            "ErrServerError" => Some(OgError::ServerError),
            "ErrProtocolError" => Some(OgError::ProtocolError),
            "ErrBadSessionKey" => Some(OgError::BadSessionKey),
            _ => None,
        }
    }
}

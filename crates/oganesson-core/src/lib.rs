//! oganesson-core — field codec, wire messages, and the cryptographic
//! provider for the Oganesson messaging framework.
//!
//! Everything in this crate is pure CPU: no sockets, no async. The session
//! crate builds the I/O layers on top of it.

pub mod crypto;
pub mod error;
pub mod field;
pub mod value;
pub mod wiremsg;

pub use error::{OgError, Result};
pub use field::{decode_all, DataField, FieldType};
pub use value::Value;
pub use wiremsg::WireMsg;

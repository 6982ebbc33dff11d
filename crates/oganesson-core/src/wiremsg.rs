//! Protocol-level messages: a command code plus named typed attachments.
//!
//! On the wire a message is exactly two field units — a `msgcode` followed
//! by a `map` — so one message always corresponds to one packet-session
//! payload.

use std::collections::BTreeMap;

use crate::error::{OgError, Result};
use crate::field::{decode_all, DataField, FieldType};
use crate::value::Value;

/// A protocol message.
///
/// Attachments are keyed by name and sorted, so a message has a single
/// canonical encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireMsg {
    /// Command code. Must be non-empty to be written to a session.
    pub code: String,

    /// Named typed fields carried with the command.
    pub attachments: BTreeMap<String, DataField>,
}

impl WireMsg {
    pub fn new(code: impl Into<String>) -> WireMsg {
        WireMsg {
            code: code.into(),
            attachments: BTreeMap::new(),
        }
    }

    /// Attach `value` under `name`, inferring the field type from the
    /// value's kind.
    pub fn add_field(&mut self, name: &str, value: &Value) -> Result<()> {
        if name.is_empty() {
            return Err(OgError::EmptyData);
        }
        self.attachments
            .insert(name.to_string(), DataField::from_value(value)?);
        Ok(())
    }

    /// Attach `value` under `name` with an explicit field type.
    pub fn add_field_as(&mut self, name: &str, ftype: FieldType, value: &Value) -> Result<()> {
        if name.is_empty() {
            return Err(OgError::EmptyData);
        }
        self.attachments
            .insert(name.to_string(), DataField::new(ftype, value)?);
        Ok(())
    }

    /// Drop the named attachment. Returns whether it was present.
    pub fn remove_field(&mut self, name: &str) -> bool {
        self.attachments.remove(name).is_some()
    }

    /// Type and decoded value of the named attachment.
    pub fn get_field(&self, name: &str) -> Result<(FieldType, Value)> {
        if name.is_empty() || self.attachments.is_empty() {
            return Err(OgError::EmptyData);
        }
        let field = self.attachments.get(name).ok_or(OgError::NotFound)?;
        Ok((field.field_type(), field.get()?))
    }

    /// Textual value of the named attachment, when it is a string or
    /// msgcode field. `None` otherwise.
    pub fn get_string_field(&self, name: &str) -> Option<String> {
        let field = self.attachments.get(name)?;
        match field.field_type() {
            FieldType::String | FieldType::MsgCode => match field.get() {
                Ok(Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.attachments.contains_key(name)
    }

    /// Serialize to `msgcode ‖ map` wire bytes.
    pub fn flatten(&self) -> Result<Vec<u8>> {
        let code = DataField::new(FieldType::MsgCode, &Value::String(self.code.clone()))?;
        let map = DataField::new(FieldType::Map, &Value::Map(self.attachments.clone()))?;
        let mut out = code.flatten();
        out.extend_from_slice(&map.flatten());
        Ok(out)
    }

    /// Parse wire bytes into a message.
    ///
    /// The buffer must hold exactly two units, a `msgcode` then a `map`;
    /// anything else is `ErrBadData`.
    pub fn unflatten(data: &[u8]) -> Result<WireMsg> {
        let fields = decode_all(data)?;
        if fields.len() != 2 {
            return Err(OgError::BadData);
        }
        let code = match (fields[0].field_type(), fields[0].get()?) {
            (FieldType::MsgCode, Value::String(code)) => code,
            _ => return Err(OgError::BadData),
        };
        let attachments = match (fields[1].field_type(), fields[1].get()?) {
            (FieldType::Map, Value::Map(map)) => map,
            _ => return Err(OgError::BadData),
        };
        Ok(WireMsg { code, attachments })
    }
}

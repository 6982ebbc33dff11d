//! Oganesson field codec — typed tag-length-value units.
//!
//! These units ARE the wire format. Every payload the framework moves is a
//! sequence of them: `tag (1 byte) ‖ length (u16 BE) ‖ value`. The type
//! registry below is closed; the code/name pairs are fixed across every
//! Oganesson implementation and changing one is a breaking change.

use std::collections::BTreeMap;

use crate::error::{OgError, Result};
use crate::value::Value;

/// Maximum encoded length of a single field value.
///
/// Variable-length values are clamped to this at encoding time. Larger
/// payloads travel as multipart packet sequences, never as one unit.
pub const MAX_VALUE_LEN: usize = 65535;

/// Bytes of framing overhead per unit (tag + u16 length).
pub const UNIT_OVERHEAD: usize = 3;

// ── Type registry ─────────────────────────────────────────────────────────────

/// Field type tags.
///
/// Code 0 (`unknown`) is an error condition, not a member: parsing it, or
/// any unassigned code, fails with `ErrBadType`. Names are for human
/// consumption only; the u8 code is what serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    String,
    Bool,
    Float32,
    Float64,
    Bytes,
    Map,
    MsgCode,
    SinglePacket,
    MultipartPacket,
    Multipart,
    MultipartFinal,
}

impl FieldType {
    /// The wire code for this type.
    pub fn code(self) -> u8 {
        match self {
            FieldType::Int8 => 1,
            FieldType::Int16 => 2,
            FieldType::Int32 => 3,
            FieldType::Int64 => 4,
            FieldType::UInt8 => 5,
            FieldType::UInt16 => 6,
            FieldType::UInt32 => 7,
            FieldType::UInt64 => 8,
            FieldType::String => 9,
            FieldType::Bool => 10,
            FieldType::Float32 => 11,
            FieldType::Float64 => 12,
            FieldType::Bytes => 13,
            FieldType::Map => 14,
            FieldType::MsgCode => 15,
            FieldType::SinglePacket => 21,
            FieldType::MultipartPacket => 22,
            FieldType::Multipart => 23,
            FieldType::MultipartFinal => 24,
        }
    }

    /// Look up a type from its wire code. `None` for code 0 and every
    /// unassigned code.
    pub fn from_code(code: u8) -> Option<FieldType> {
        match code {
            1 => Some(FieldType::Int8),
            2 => Some(FieldType::Int16),
            3 => Some(FieldType::Int32),
            4 => Some(FieldType::Int64),
            5 => Some(FieldType::UInt8),
            6 => Some(FieldType::UInt16),
            7 => Some(FieldType::UInt32),
            8 => Some(FieldType::UInt64),
            9 => Some(FieldType::String),
            10 => Some(FieldType::Bool),
            11 => Some(FieldType::Float32),
            12 => Some(FieldType::Float64),
            13 => Some(FieldType::Bytes),
            14 => Some(FieldType::Map),
            15 => Some(FieldType::MsgCode),
            21 => Some(FieldType::SinglePacket),
            22 => Some(FieldType::MultipartPacket),
            23 => Some(FieldType::Multipart),
            24 => Some(FieldType::MultipartFinal),
            _ => None,
        }
    }

    /// Human-readable registry name.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt8 => "uint8",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::Bytes => "bytes",
            FieldType::Map => "map",
            FieldType::MsgCode => "msgcode",
            FieldType::SinglePacket => "singlepacket",
            FieldType::MultipartPacket => "multipartpacket",
            FieldType::Multipart => "multipart",
            FieldType::MultipartFinal => "multipartfinal",
        }
    }

    /// Look up a type from its registry name.
    pub fn from_name(name: &str) -> Option<FieldType> {
        match name {
            "int8" => Some(FieldType::Int8),
            "int16" => Some(FieldType::Int16),
            "int32" => Some(FieldType::Int32),
            "int64" => Some(FieldType::Int64),
            "uint8" => Some(FieldType::UInt8),
            "uint16" => Some(FieldType::UInt16),
            "uint32" => Some(FieldType::UInt32),
            "uint64" => Some(FieldType::UInt64),
            "string" => Some(FieldType::String),
            "bool" => Some(FieldType::Bool),
            "float32" => Some(FieldType::Float32),
            "float64" => Some(FieldType::Float64),
            "bytes" => Some(FieldType::Bytes),
            "map" => Some(FieldType::Map),
            "msgcode" => Some(FieldType::MsgCode),
            "singlepacket" => Some(FieldType::SinglePacket),
            "multipartpacket" => Some(FieldType::MultipartPacket),
            "multipart" => Some(FieldType::Multipart),
            "multipartfinal" => Some(FieldType::MultipartFinal),
            _ => None,
        }
    }

    /// Encoded value size for fixed-width types; `None` for variable ones.
    ///
    /// The multipart header is a u64 total-length announcement (8 bytes).
    /// The source of this protocol used a u16 here, which cannot describe
    /// the payloads multipart framing exists for.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            FieldType::Int8 | FieldType::UInt8 | FieldType::Bool => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => Some(4),
            FieldType::Int64
            | FieldType::UInt64
            | FieldType::Float64
            | FieldType::MultipartPacket => Some(8),
            FieldType::String
            | FieldType::Bytes
            | FieldType::Map
            | FieldType::MsgCode
            | FieldType::SinglePacket
            | FieldType::Multipart
            | FieldType::MultipartFinal => None,
        }
    }
}

// ── Range checks ──────────────────────────────────────────────────────────────

fn int_fits(value: i128, bits: u32) -> bool {
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    (min..=max).contains(&value)
}

fn uint_fits(value: i128, bits: u32) -> bool {
    value >= 0 && value <= (1i128 << bits) - 1
}

fn encode_signed(value: &Value, bits: u32) -> Result<Vec<u8>> {
    let v = value.as_int().ok_or(OgError::BadValue)?;
    if !int_fits(v, bits) {
        return Err(OgError::OutOfRange);
    }
    // Two's-complement i128 big-endian, truncated to the target width.
    Ok(v.to_be_bytes()[16 - bits as usize / 8..].to_vec())
}

fn encode_unsigned(value: &Value, bits: u32) -> Result<Vec<u8>> {
    let v = value.as_int().ok_or(OgError::BadValue)?;
    if !uint_fits(v, bits) {
        return Err(OgError::OutOfRange);
    }
    Ok((v as u128).to_be_bytes()[16 - bits as usize / 8..].to_vec())
}

// ── DataField ─────────────────────────────────────────────────────────────────

/// One typed field: a type tag plus the value's canonical encoded bytes.
///
/// Two fields are equal iff both the type and the raw bytes are equal.
/// Construction always validates, so a `DataField` in hand is decodable.
#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    ftype: FieldType,
    raw: Vec<u8>,
}

impl DataField {
    /// Encode `value` as a field of type `ftype`.
    ///
    /// Fails with `ErrBadValue` on a kind mismatch and `ErrOutOfRange` when
    /// an integer does not fit the width. Variable-length values are
    /// clamped to [`MAX_VALUE_LEN`]; strings are cut at the last character
    /// boundary at or below it so the stored bytes stay valid UTF-8.
    pub fn new(ftype: FieldType, value: &Value) -> Result<DataField> {
        let raw = encode_value(ftype, value)?;
        Ok(DataField { ftype, raw })
    }

    /// Encode `value` with an inferred type: the narrowest signed integer
    /// width that holds it, else the narrowest unsigned; floats widen to
    /// `float64`; strings, byte arrays, bools, and maps keep their kind.
    pub fn from_value(value: &Value) -> Result<DataField> {
        let ftype = match value {
            Value::Int8(_)
            | Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::UInt8(_)
            | Value::UInt16(_)
            | Value::UInt32(_)
            | Value::UInt64(_) => {
                let v = value.as_int().ok_or(OgError::BadValue)?;
                narrowest_int_type(v)
            }
            Value::Bool(_) => FieldType::Bool,
            Value::Float32(_) | Value::Float64(_) => FieldType::Float64,
            Value::String(_) => FieldType::String,
            Value::Bytes(_) => FieldType::Bytes,
            Value::Map(_) => FieldType::Map,
        };
        DataField::new(ftype, value)
    }

    /// Replace this field's type and value. Atomic: on error the field is
    /// left untouched, and repeating the same call leaves it unchanged.
    pub fn set(&mut self, ftype: FieldType, value: &Value) -> Result<()> {
        let raw = encode_value(ftype, value)?;
        self.ftype = ftype;
        self.raw = raw;
        Ok(())
    }

    /// Decode the stored bytes back into a typed value.
    pub fn get(&self) -> Result<Value> {
        match self.ftype {
            FieldType::Int8 => Ok(Value::Int8(i8::from_be_bytes(self.fixed_raw()?))),
            FieldType::Int16 => Ok(Value::Int16(i16::from_be_bytes(self.fixed_raw()?))),
            FieldType::Int32 => Ok(Value::Int32(i32::from_be_bytes(self.fixed_raw()?))),
            FieldType::Int64 => Ok(Value::Int64(i64::from_be_bytes(self.fixed_raw()?))),
            FieldType::UInt8 => Ok(Value::UInt8(u8::from_be_bytes(self.fixed_raw()?))),
            FieldType::UInt16 => Ok(Value::UInt16(u16::from_be_bytes(self.fixed_raw()?))),
            FieldType::UInt32 => Ok(Value::UInt32(u32::from_be_bytes(self.fixed_raw()?))),
            FieldType::UInt64 => Ok(Value::UInt64(u64::from_be_bytes(self.fixed_raw()?))),
            FieldType::Bool => match self.raw.as_slice() {
                [0] => Ok(Value::Bool(false)),
                [1] => Ok(Value::Bool(true)),
                _ => Err(OgError::BadValue),
            },
            FieldType::Float32 => Ok(Value::Float32(f32::from_be_bytes(self.fixed_raw()?))),
            FieldType::Float64 => Ok(Value::Float64(f64::from_be_bytes(self.fixed_raw()?))),
            FieldType::String | FieldType::MsgCode => std::str::from_utf8(&self.raw)
                .map(|s| Value::String(s.to_string()))
                .map_err(|_| OgError::BadValue),
            FieldType::Bytes
            | FieldType::SinglePacket
            | FieldType::Multipart
            | FieldType::MultipartFinal => Ok(Value::Bytes(self.raw.clone())),
            FieldType::Map => Ok(Value::Map(decode_map(&self.raw)?)),
            FieldType::MultipartPacket => {
                Ok(Value::UInt64(u64::from_be_bytes(self.fixed_raw()?)))
            }
        }
    }

    /// Serialize to one wire unit: `tag ‖ length ‖ value`.
    pub fn flatten(&self) -> Vec<u8> {
        debug_assert!(self.raw.len() <= MAX_VALUE_LEN);
        let len = self.raw.len().min(MAX_VALUE_LEN);
        let mut out = Vec::with_capacity(UNIT_OVERHEAD + len);
        out.push(self.ftype.code());
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(&self.raw[..len]);
        out
    }

    /// Parse one complete wire unit.
    ///
    /// The unit must be the entire buffer: a declared length shorter or
    /// longer than the remaining bytes is `ErrSize`. The payload is fully
    /// validated before a field is returned.
    pub fn unflatten(data: &[u8]) -> Result<DataField> {
        if data.len() < UNIT_OVERHEAD + 1 {
            return Err(OgError::BadData);
        }
        let ftype = FieldType::from_code(data[0]).ok_or(OgError::BadType)?;
        let length = u16::from_be_bytes([data[1], data[2]]) as usize;
        if data.len() - UNIT_OVERHEAD != length {
            return Err(OgError::Size);
        }
        let field = DataField {
            ftype,
            raw: data[UNIT_OVERHEAD..].to_vec(),
        };
        field.get()?;
        Ok(field)
    }

    /// Serialized size of this field: 3 header bytes plus the value.
    pub fn flat_size(&self) -> usize {
        UNIT_OVERHEAD + self.raw.len()
    }

    /// Does the stored length match what the type predicts on the wire?
    pub fn is_valid(&self) -> bool {
        match self.ftype.fixed_size() {
            Some(n) => self.raw.len() == n,
            None => self.raw.len() <= MAX_VALUE_LEN,
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.ftype
    }

    /// The canonical encoded bytes of the value.
    pub fn raw_value(&self) -> &[u8] {
        &self.raw
    }

    /// Consume the field, yielding the encoded value bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    /// Build the reassembled packet handed out by the session read path.
    ///
    /// Unlike `new`, the payload is not clamped to [`MAX_VALUE_LEN`]: a
    /// reassembled multipart payload is larger than any single unit and is
    /// consumed via [`DataField::raw_value`], never re-flattened whole.
    pub fn assembled_packet(payload: Vec<u8>) -> DataField {
        DataField {
            ftype: FieldType::SinglePacket,
            raw: payload,
        }
    }

    fn fixed_raw<const N: usize>(&self) -> Result<[u8; N]> {
        self.raw.as_slice().try_into().map_err(|_| OgError::BadValue)
    }
}

fn narrowest_int_type(v: i128) -> FieldType {
    if int_fits(v, 8) {
        FieldType::Int8
    } else if int_fits(v, 16) {
        FieldType::Int16
    } else if int_fits(v, 32) {
        FieldType::Int32
    } else if int_fits(v, 64) {
        FieldType::Int64
    } else if uint_fits(v, 8) {
        FieldType::UInt8
    } else if uint_fits(v, 16) {
        FieldType::UInt16
    } else if uint_fits(v, 32) {
        FieldType::UInt32
    } else {
        FieldType::UInt64
    }
}

fn encode_value(ftype: FieldType, value: &Value) -> Result<Vec<u8>> {
    match ftype {
        FieldType::Int8 => encode_signed(value, 8),
        FieldType::Int16 => encode_signed(value, 16),
        FieldType::Int32 => encode_signed(value, 32),
        FieldType::Int64 => encode_signed(value, 64),
        FieldType::UInt8 => encode_unsigned(value, 8),
        FieldType::UInt16 => encode_unsigned(value, 16),
        FieldType::UInt32 => encode_unsigned(value, 32),
        FieldType::UInt64 | FieldType::MultipartPacket => encode_unsigned(value, 64),
        FieldType::Bool => match value {
            Value::Bool(b) => Ok(vec![u8::from(*b)]),
            _ => Err(OgError::BadValue),
        },
        FieldType::Float32 => {
            let v = value.as_float().ok_or(OgError::BadValue)?;
            Ok((v as f32).to_be_bytes().to_vec())
        }
        FieldType::Float64 => {
            let v = value.as_float().ok_or(OgError::BadValue)?;
            Ok(v.to_be_bytes().to_vec())
        }
        FieldType::String | FieldType::MsgCode => {
            let s = value.as_str().ok_or(OgError::BadValue)?;
            Ok(truncate_utf8(s).to_vec())
        }
        FieldType::Bytes
        | FieldType::SinglePacket
        | FieldType::Multipart
        | FieldType::MultipartFinal => {
            let b = value.as_bytes().ok_or(OgError::BadValue)?;
            Ok(b[..b.len().min(MAX_VALUE_LEN)].to_vec())
        }
        FieldType::Map => {
            let m = value.as_map().ok_or(OgError::BadValue)?;
            encode_map(m)
        }
    }
}

/// Longest prefix of `s` that fits the wire limit without splitting a
/// character.
fn truncate_utf8(s: &str) -> &[u8] {
    if s.len() <= MAX_VALUE_LEN {
        return s.as_bytes();
    }
    let mut end = MAX_VALUE_LEN;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

// ── Map payload ───────────────────────────────────────────────────────────────

// A map value is itself a run of field units: one uint16 entry count, then
// for each entry a string key unit followed by a value unit. Nested maps
// are disallowed in both directions.

fn encode_map(entries: &BTreeMap<String, DataField>) -> Result<Vec<u8>> {
    if entries.len() > u16::MAX as usize {
        return Err(OgError::Size);
    }
    for field in entries.values() {
        if field.field_type() == FieldType::Map {
            return Err(OgError::BadValue);
        }
    }
    let count = DataField::new(FieldType::UInt16, &Value::UInt16(entries.len() as u16))?;
    let mut out = count.flatten();
    for (key, field) in entries {
        out.extend_from_slice(
            &DataField::new(FieldType::String, &Value::String(key.clone()))?.flatten(),
        );
        out.extend_from_slice(&field.flatten());
    }
    if out.len() > MAX_VALUE_LEN {
        return Err(OgError::Size);
    }
    Ok(out)
}

fn decode_map(raw: &[u8]) -> Result<BTreeMap<String, DataField>> {
    let units = split_units(raw)?;
    if units.is_empty() {
        return Err(OgError::BadData);
    }
    let count_field = DataField::unflatten(units[0])?;
    if count_field.field_type() != FieldType::UInt16 {
        return Err(OgError::BadData);
    }
    let count = match count_field.get()? {
        Value::UInt16(n) => n as usize,
        _ => return Err(OgError::BadData),
    };
    if units.len() != 2 * count + 1 {
        return Err(OgError::BadData);
    }
    let mut entries = BTreeMap::new();
    for pair in units[1..].chunks_exact(2) {
        // Reject a nested container by tag, before parsing its payload.
        if pair[1].first() == Some(&FieldType::Map.code()) {
            return Err(OgError::BadData);
        }
        let key_field = DataField::unflatten(pair[0])?;
        if key_field.field_type() != FieldType::String {
            return Err(OgError::BadData);
        }
        let key = match key_field.get()? {
            Value::String(s) => s,
            _ => return Err(OgError::BadData),
        };
        // Duplicate keys: last writer wins.
        entries.insert(key, DataField::unflatten(pair[1])?);
    }
    Ok(entries)
}

// ── Buffer walking ────────────────────────────────────────────────────────────

/// Split a buffer into raw unit slices using only the length prefixes.
fn split_units(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut units = Vec::new();
    let mut index = 0;
    while index < data.len() {
        if data.len() - index < UNIT_OVERHEAD {
            return Err(OgError::BadData);
        }
        let length = u16::from_be_bytes([data[index + 1], data[index + 2]]) as usize;
        let end = index + UNIT_OVERHEAD + length;
        if end > data.len() {
            return Err(OgError::Size);
        }
        units.push(&data[index..end]);
        index = end;
    }
    Ok(units)
}

/// Parse a buffer as a concatenation of complete field units.
pub fn decode_all(data: &[u8]) -> Result<Vec<DataField>> {
    split_units(data)?
        .into_iter()
        .map(DataField::unflatten)
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

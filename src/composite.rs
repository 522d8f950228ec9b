//! Composite (record) type codec: text and binary wire formats for
//! PostgreSQL `ROW(...)`-shaped values.
//!
//! Grounded on spec.md §4.1's composite grammar and on
//! `original_source/psycopg3/types/composite.py`'s `CompositeTypeInfo`/
//! `FieldInfo`/`register` shape. Loaders are generated by parameterizing
//! over a field-oid list and a constructor function pointer rather than
//! synthesizing a class at runtime, per SPEC_FULL §9's design note.

use std::any::{Any, TypeId};

use crate::error::{DriverError, DriverResult};
use crate::protocol::types::{FormatCode, Oid};
use crate::transformer::Transformer;

/// One field of a registered composite type.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub type_oid: Oid,
}

/// Server-side metadata for a composite (or `record`) type, as fetched via
/// a registration helper (analogous to `fetch_info` in the original
/// source) and cached for the life of the process.
#[derive(Debug, Clone)]
pub struct CompositeTypeInfo {
    pub name: String,
    pub oid: Oid,
    pub array_oid: Oid,
    pub fields: Vec<FieldInfo>,
}

impl CompositeTypeInfo {
    pub fn field_oids(&self) -> Vec<Oid> {
        self.fields.iter().map(|f| f.type_oid).collect()
    }
}

// === Wire-level text codec ===

/// Parse a composite text payload (`(field,field,...)`) into raw,
/// un-escaped per-field byte buffers. `NULL` fields become `None`.
///
/// `expected_fields` resolves the `()` ambiguity described in SPEC_FULL
/// §4.8: a zero-field tuple and a one-field tuple whose sole value is NULL
/// both serialize to the literal string `()`; the caller already knows
/// which case applies from the registered field count.
pub fn parse_text(payload: &[u8], expected_fields: usize) -> DriverResult<Vec<Option<Vec<u8>>>> {
    if payload.first() != Some(&b'(') || payload.last() != Some(&b')') {
        return Err(DriverError::Decode(
            "composite text value must be wrapped in parentheses".into(),
        ));
    }
    let inner = &payload[1..payload.len() - 1];

    if inner.is_empty() {
        return match expected_fields {
            0 => Ok(Vec::new()),
            1 => Ok(vec![None]),
            n => Err(DriverError::Decode(format!(
                "composite payload '()' cannot satisfy {n} declared fields"
            ))),
        };
    }

    let mut fields = Vec::new();
    let mut i = 0;
    loop {
        let (field, consumed) = parse_one_field(&inner[i..])?;
        fields.push(field);
        i += consumed;
        if i >= inner.len() {
            break;
        }
        if inner[i] != b',' {
            return Err(DriverError::Decode(
                "expected ',' between composite fields".into(),
            ));
        }
        i += 1;
        if i == inner.len() {
            fields.push(None);
            break;
        }
    }

    if fields.len() != expected_fields {
        return Err(DriverError::Decode(format!(
            "composite payload has {} fields, expected {expected_fields}",
            fields.len()
        )));
    }
    Ok(fields)
}

fn parse_one_field(data: &[u8]) -> DriverResult<(Option<Vec<u8>>, usize)> {
    if data.first() == Some(&b'"') {
        let mut out = Vec::new();
        let mut i = 1;
        loop {
            match data.get(i) {
                None => {
                    return Err(DriverError::Decode(
                        "unterminated quoted composite field".into(),
                    ));
                }
                Some(b'"') => {
                    if data.get(i + 1) == Some(&b'"') {
                        out.push(b'"');
                        i += 2;
                    } else {
                        return Ok((Some(out), i + 1));
                    }
                }
                Some(b'\\') => match data.get(i + 1) {
                    Some(&escaped) => {
                        out.push(escaped);
                        i += 2;
                    }
                    None => {
                        return Err(DriverError::Decode(
                            "unterminated escape in composite field".into(),
                        ));
                    }
                },
                Some(&b) => {
                    out.push(b);
                    i += 1;
                }
            }
        }
    } else {
        let mut i = 0;
        while i < data.len() && data[i] != b',' {
            i += 1;
        }
        if i == 0 {
            Ok((None, 0))
        } else {
            Ok((Some(data[..i].to_vec()), i))
        }
    }
}

/// Encode fields (already domain-encoded raw bytes, `None` for NULL) as a
/// composite text payload. Joining with `,` as a separator (not a
/// terminator) reproduces `record_out`'s behavior exactly: a zero-field
/// tuple and a one-field-NULL tuple both produce `()`.
pub fn encode_text(fields: &[Option<&[u8]>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() * 8 + 2);
    out.push(b'(');
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        if let Some(bytes) = field {
            encode_one_field(bytes, &mut out);
        }
    }
    out.push(b')');
    out
}

fn encode_one_field(bytes: &[u8], out: &mut Vec<u8>) {
    let needs_quoting = bytes.is_empty()
        || bytes
            .iter()
            .any(|&b| matches!(b, b'"' | b',' | b'\\' | b'(' | b')') || b.is_ascii_whitespace());

    if !needs_quoting {
        out.extend_from_slice(bytes);
        return;
    }

    out.push(b'"');
    for &b in bytes {
        if b == b'"' || b == b'\\' {
            out.push(b);
        }
        out.push(b);
    }
    out.push(b'"');
}

// === Wire-level binary codec ===

/// Parse a composite binary payload: `int32 nfields` followed by
/// `nfields × { uint32 oid, int32 length, length×bytes }`; `length = -1`
/// encodes NULL.
pub fn parse_binary(payload: &[u8]) -> DriverResult<Vec<(Oid, Option<Vec<u8>>)>> {
    let header = payload
        .get(0..4)
        .ok_or_else(|| DriverError::Decode("composite binary payload too short".into()))?;
    let nfields = i32::from_be_bytes(header.try_into().map_err(|_| {
        DriverError::Decode("malformed composite field count".into())
    })?);
    if nfields < 0 {
        return Err(DriverError::Decode(
            "negative composite field count".into(),
        ));
    }

    let mut fields = Vec::with_capacity(nfields as usize);
    let mut i = 4;
    for _ in 0..nfields {
        let oid_bytes = payload
            .get(i..i + 4)
            .ok_or_else(|| DriverError::Decode("truncated composite field oid".into()))?;
        let oid = u32::from_be_bytes(
            oid_bytes
                .try_into()
                .map_err(|_| DriverError::Decode("malformed composite field oid".into()))?,
        );
        i += 4;

        let len_bytes = payload
            .get(i..i + 4)
            .ok_or_else(|| DriverError::Decode("truncated composite field length".into()))?;
        let len = i32::from_be_bytes(
            len_bytes
                .try_into()
                .map_err(|_| DriverError::Decode("malformed composite field length".into()))?,
        );
        i += 4;

        if len == -1 {
            fields.push((oid, None));
            continue;
        }
        let len = len as usize;
        let value = payload
            .get(i..i + len)
            .ok_or_else(|| DriverError::Decode("truncated composite field payload".into()))?;
        fields.push((oid, Some(value.to_vec())));
        i += len;
    }
    Ok(fields)
}

/// Encode `(oid, bytes)` pairs as a composite binary payload.
pub fn encode_binary(fields: &[(Oid, Option<&[u8]>)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() * 16 + 4);
    out.extend_from_slice(&(fields.len() as i32).to_be_bytes());
    for (oid, value) in fields {
        out.extend_from_slice(&oid.to_be_bytes());
        match value {
            None => out.extend_from_slice(&(-1_i32).to_be_bytes()),
            Some(bytes) => {
                out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }
    out
}

// === Transformer-backed load/dump ===

/// Decode a composite payload's fields into type-erased values via the
/// Transformer's registry-resolved loaders, keyed by the declared field
/// oids in `info`.
pub fn load_fields(
    transformer: &Transformer<'_>,
    info: &CompositeTypeInfo,
    payload: &[u8],
    format: FormatCode,
) -> DriverResult<Vec<Option<Box<dyn Any>>>> {
    let oids = info.field_oids();
    match format {
        FormatCode::Text => {
            let raw = parse_text(payload, info.fields.len())?;
            let borrowed: Vec<Option<&[u8]>> = raw.iter().map(|f| f.as_deref()).collect();
            transformer.load_sequence(&borrowed, &oids, FormatCode::Text)
        }
        FormatCode::Binary => {
            let raw = parse_binary(payload)?;
            if raw.len() != info.fields.len() {
                return Err(DriverError::Decode(format!(
                    "composite binary payload has {} fields, expected {}",
                    raw.len(),
                    info.fields.len()
                )));
            }
            let borrowed: Vec<Option<&[u8]>> = raw.iter().map(|(_, b)| b.as_deref()).collect();
            transformer.load_sequence(&borrowed, &oids, FormatCode::Binary)
        }
    }
}

/// Encode a composite's fields (type-erased, declaration order, `None` for
/// NULL) into a wire payload via the Transformer's registry-resolved
/// dumpers.
pub fn dump_fields(
    transformer: &Transformer<'_>,
    info: &CompositeTypeInfo,
    values: &[Option<(TypeId, &dyn Any)>],
    format: FormatCode,
) -> DriverResult<Vec<u8>> {
    if values.len() != info.fields.len() {
        return Err(DriverError::Internal(
            "dump_fields: value count does not match declared field count".into(),
        ));
    }
    let oids = info.field_oids();
    let payloads = transformer.dump_sequence(values, &oids, format)?;

    match format {
        FormatCode::Text => {
            let borrowed: Vec<Option<&[u8]>> = payloads.iter().map(|p| p.as_deref()).collect();
            Ok(encode_text(&borrowed))
        }
        FormatCode::Binary => {
            let pairs: Vec<(Oid, Option<&[u8]>)> = oids
                .iter()
                .zip(&payloads)
                .map(|(&oid, payload)| (oid, payload.as_deref()))
                .collect();
            Ok(encode_binary(&pairs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tuple_and_single_null_both_encode_as_parens() {
        assert_eq!(encode_text(&[]), b"()".to_vec());
        assert_eq!(encode_text(&[None]), b"()".to_vec());
    }

    #[test]
    fn parens_resolve_by_declared_arity() {
        assert_eq!(parse_text(b"()", 0).unwrap(), Vec::<Option<Vec<u8>>>::new());
        assert_eq!(parse_text(b"()", 1).unwrap(), vec![None]);
        assert!(parse_text(b"()", 2).is_err());
    }

    #[test]
    fn text_round_trip_with_quoting() {
        let fields: Vec<Option<&[u8]>> = vec![Some(b"hello, world"), None, Some(b"\"quoted\"")];
        let encoded = encode_text(&fields);
        let decoded = parse_text(&encoded, 3).unwrap();
        assert_eq!(decoded[0].as_deref(), Some(&b"hello, world"[..]));
        assert_eq!(decoded[1], None);
        assert_eq!(decoded[2].as_deref(), Some(&b"\"quoted\""[..]));
    }

    #[test]
    fn binary_round_trip() {
        let fields: Vec<(Oid, Option<&[u8]>)> = vec![(23, Some(&[0, 0, 0, 1])), (25, None)];
        let encoded = encode_binary(&fields);
        let decoded = parse_binary(&encoded).unwrap();
        assert_eq!(decoded[0], (23, Some(vec![0, 0, 0, 1])));
        assert_eq!(decoded[1], (25, None));
    }
}

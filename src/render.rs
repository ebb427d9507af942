//! Serde helpers for binary values in results: UTF-8 when it is valid,
//! otherwise `base64:` followed by standard base64. Text that itself starts
//! with `base64:` is encoded too, so the two forms never collide.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Serializer, ser::SerializeMap, ser::SerializeSeq};

const BASE64_PREFIX: &str = "base64:";

pub fn display_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.starts_with(BASE64_PREFIX) => s.to_string(),
        _ => format!(
            "{BASE64_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}

/// Inverse of [`display_bytes`], for values given back on the command line.
pub fn parse_bytes(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    match text.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => base64::engine::general_purpose::STANDARD.decode(encoded),
        None => Ok(text.as_bytes().to_vec()),
    }
}

pub fn opt_bytes<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&display_bytes(v)),
        None => serializer.serialize_none(),
    }
}

pub fn bytes_list<S: Serializer>(values: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for v in values {
        seq.serialize_element(&display_bytes(v))?;
    }
    seq.end()
}

pub fn bytes_map<S: Serializer>(
    values: &BTreeMap<String, Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(values.len()))?;
    for (k, v) in values {
        map.serialize_entry(k, &display_bytes(v))?;
    }
    map.end()
}

pub fn bytes_list_map<S: Serializer>(
    values: &BTreeMap<String, Vec<Vec<u8>>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(values.len()))?;
    for (k, v) in values {
        let rendered: Vec<String> = v.iter().map(|b| display_bytes(b)).collect();
        map.serialize_entry(k, &rendered)?;
    }
    map.end()
}

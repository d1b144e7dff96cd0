//! Cache codec
//!
//! Two independent concerns:
//!
//! 1. Structural encoding: every category value is stored as a JSON document.
//! 2. Remote score-cache payloads: gzip compressed and possibly wrapped in a
//!    `{"data": <payload>, "status": "success"}` envelope. The envelope is
//!    stripped before structural decoding; a payload that fails to
//!    decompress is a hard error, not a miss.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use crate::error::{Result, StorageError};

const ENVELOPE_DATA: &str = "data";
const ENVELOPE_STATUS: &str = "status";
const STATUS_SUCCESS: &str = "success";

/// Encode a value as a self-describing JSON document
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a JSON document produced by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Remove the status envelope, if any
///
/// Documents that are not an envelope are returned unchanged. An envelope
/// whose status is anything but `success` is an error.
pub fn strip_envelope(bytes: &[u8]) -> Result<Vec<u8>> {
    let document: serde_json::Value = serde_json::from_slice(bytes)?;
    let serde_json::Value::Object(mut fields) = document else {
        return Ok(bytes.to_vec());
    };
    if fields.len() != 2 || !fields.contains_key(ENVELOPE_DATA) {
        return Ok(bytes.to_vec());
    }
    match fields.get(ENVELOPE_STATUS) {
        Some(serde_json::Value::String(status)) if status == STATUS_SUCCESS => {
            let payload = fields.remove(ENVELOPE_DATA).unwrap_or_default();
            encode(&payload)
        }
        Some(serde_json::Value::String(status)) => Err(StorageError::envelope(status.clone())),
        _ => Ok(bytes.to_vec()),
    }
}

/// Wrap a payload in a success envelope
pub fn wrap_envelope(payload: &[u8]) -> Result<Vec<u8>> {
    let data: serde_json::Value = serde_json::from_slice(payload)?;
    encode(&serde_json::json!({ "data": data, "status": STATUS_SUCCESS }))
}

pub fn gzip_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| {
        StorageError::compression(format!("gzip decode failed: {}", e)).with_source(e)
    })?;
    Ok(out)
}

/// Decode a remote score-cache field: gunzip, strip envelope, decode
pub fn decode_remote<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let raw = gzip_decompress(bytes)?;
    let payload = strip_envelope(&raw)?;
    decode(&payload)
}

/// Inverse of [`decode_remote`], always enveloped
pub fn encode_remote<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let payload = encode(value)?;
    gzip_compress(&wrap_envelope(&payload)?)
}

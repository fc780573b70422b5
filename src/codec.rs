//! Value codec: structural-first encoding with an opaque binary fallback
//!
//! The codec turns a [`CacheValue`] into whatever the underlying store can
//! hold and back, without loss:
//!
//! - The byte envelope (`encode`/`decode`) prefixes every payload with a
//!   header byte: `0x00` for structural (JSON) payloads, `0x01` for opaque
//!   binary payloads. Used by the byte-oriented stores (disk, Memcached).
//! - The KV form (`encode_kv`/`decode_kv`) stores structural payloads as bare
//!   JSON text so that integers land as plain digit strings and the server's
//!   native increment interoperates; opaque payloads still carry the `0x01`
//!   header, which can never be the first byte of a JSON text, so decoding
//!   stays unambiguous without sniffing.
//!
//! The typed helpers (`to_value`/`from_value`) implement the fallback path
//! for arbitrary `Serialize` types: structural encoding first, opaque bincode
//! when the value cannot be represented as JSON.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::entry::CacheValue;
use crate::error::{CacheError, CacheResult};

/// Header byte for structurally (JSON) encoded payloads.
const TAG_STRUCTURAL: u8 = 0x00;
/// Header byte for opaque binary payloads. JSON text never starts with it.
const TAG_OPAQUE: u8 = 0x01;

/// Stateless codec shared by all backends.
#[derive(Debug, Default, Clone)]
pub struct ValueCodec;

impl ValueCodec {
    /// Convert any serializable value into a [`CacheValue`].
    ///
    /// Tries the structural (JSON) encoding first; values the structural
    /// encoder cannot represent fall back to an opaque bincode payload.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] when both encodings fail.
    pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CacheResult<CacheValue> {
        match serde_json::to_value(value) {
            Ok(v) => Ok(CacheValue::Json(v)),
            Err(json_err) => match bincode::serialize(value) {
                Ok(bytes) => Ok(CacheValue::Bytes(bytes)),
                Err(bin_err) => Err(CacheError::Serialization(format!(
                    "structural encoding failed ({json_err}); opaque encoding failed ({bin_err})"
                ))),
            },
        }
    }

    /// Convert a [`CacheValue`] back into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the payload does not decode
    /// into `T`.
    pub fn from_value<T: DeserializeOwned>(value: &CacheValue) -> CacheResult<T> {
        match value {
            CacheValue::Json(v) => Ok(serde_json::from_value(v.clone())?),
            CacheValue::Bytes(b) => Ok(bincode::deserialize(b)?),
        }
    }

    /// Encode into the tagged byte envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the structural payload cannot
    /// be written as JSON.
    pub fn encode(value: &CacheValue) -> CacheResult<Vec<u8>> {
        match value {
            CacheValue::Json(v) => {
                let mut out = vec![TAG_STRUCTURAL];
                serde_json::to_writer(&mut out, v)?;
                Ok(out)
            }
            CacheValue::Bytes(b) => {
                let mut out = Vec::with_capacity(b.len() + 1);
                out.push(TAG_OPAQUE);
                out.extend_from_slice(b);
                Ok(out)
            }
        }
    }

    /// Decode from the tagged byte envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] on an empty payload, an unknown
    /// header byte, or a corrupt structural body.
    pub fn decode(raw: &[u8]) -> CacheResult<CacheValue> {
        match raw.split_first() {
            Some((&TAG_STRUCTURAL, rest)) => Ok(CacheValue::Json(serde_json::from_slice(rest)?)),
            Some((&TAG_OPAQUE, rest)) => Ok(CacheValue::Bytes(rest.to_vec())),
            Some((tag, _)) => Err(CacheError::Serialization(format!(
                "unrecognized payload header byte 0x{tag:02x}"
            ))),
            None => Err(CacheError::Serialization("empty payload".to_string())),
        }
    }

    /// Encode into the KV form: bare JSON text for structural payloads,
    /// `0x01`-prefixed raw bytes for opaque payloads.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the structural payload cannot
    /// be written as JSON.
    pub fn encode_kv(value: &CacheValue) -> CacheResult<Vec<u8>> {
        match value {
            CacheValue::Json(v) => Ok(serde_json::to_vec(v)?),
            CacheValue::Bytes(b) => {
                let mut out = Vec::with_capacity(b.len() + 1);
                out.push(TAG_OPAQUE);
                out.extend_from_slice(b);
                Ok(out)
            }
        }
    }

    /// Decode from the KV form.
    ///
    /// Values written by the server's own increment arrive as bare integer
    /// text, which parses as a structural number.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the payload is neither an
    /// opaque envelope nor valid JSON text.
    pub fn decode_kv(raw: &[u8]) -> CacheResult<CacheValue> {
        if let Some((&TAG_OPAQUE, rest)) = raw.split_first() {
            return Ok(CacheValue::Bytes(rest.to_vec()));
        }
        Ok(CacheValue::Json(serde_json::from_slice(raw)?))
    }
}

//! Embedded runner payload.
//!
//! The exported runner carries one script and its template image as a single
//! text blob: JSON, zlib-compressed, base64-encoded, reversed, and suffixed
//! with a marker. This only keeps the payload from being casually readable.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::script::ScriptRecord;

pub const BLOB_SUFFIX: &str = "_PYC_";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob is missing the '{BLOB_SUFFIX}' marker")]
    MissingSuffix,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decompression failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Script plus the base64 template image it was exported with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedScript {
    #[serde(flatten)]
    pub script: ScriptRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_data: Option<String>,
}

impl EmbeddedScript {
    pub fn new(script: ScriptRecord, template_png: Option<&[u8]>) -> Self {
        Self {
            script,
            template_data: template_png.map(|bytes| STANDARD.encode(bytes)),
        }
    }

    /// Raw bytes of the embedded template image, if any
    pub fn template_bytes(&self) -> Result<Option<Vec<u8>>, BlobError> {
        self.template_data
            .as_deref()
            .map(|data| STANDARD.decode(data.trim()))
            .transpose()
            .map_err(BlobError::from)
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, BlobError> {
    let json = serde_json::to_vec(value)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    let mut out: String = STANDARD.encode(compressed).chars().rev().collect();
    out.push_str(BLOB_SUFFIX);
    Ok(out)
}

pub fn decode<T: DeserializeOwned>(blob: &str) -> Result<T, BlobError> {
    let body = blob
        .trim()
        .strip_suffix(BLOB_SUFFIX)
        .ok_or(BlobError::MissingSuffix)?;

    let forward: String = body.chars().rev().collect();
    let compressed = STANDARD.decode(forward)?;

    let mut json = String::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_string(&mut json)?;
    Ok(serde_json::from_str(&json)?)
}

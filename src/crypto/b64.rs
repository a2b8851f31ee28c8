//! URL-safe base64 as used on the wire.
//!
//! Keys, attribute blobs and handles travel as base64 with the `-`/`_`
//! alphabet and no padding. Decoding tolerates padded input by stripping
//! trailing `=` first, since some producers still emit it.

use crate::libs::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encodes bytes as unpadded URL-safe base64.
pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes URL-safe base64, with or without `=` padding.
pub fn decode(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| Error::BadResp(format!("invalid base64: {e}")))
}

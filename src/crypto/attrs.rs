//! Node attribute codec.
//!
//! Attributes are a small key/value record carrying at least the display
//! name. On the wire the record is the ASCII magic `"MEGA"` followed by its
//! JSON encoding, zero-padded to a block boundary and CBC-encrypted under
//! the node key with a zero IV. Decoding fails when the magic is absent,
//! which is how a wrong key announces itself; callers treat that as
//! non-fatal during manifest ingestion.

use crate::crypto::cipher::{cbc_decrypt, Aes128CbcEnc, BLOCK_SIZE};
use crate::libs::error::{Error, Result};
use block_padding::ZeroPadding;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};

/// Magic prefix of every attribute blob.
const ATTR_MAGIC: &[u8; 4] = b"MEGA";

/// Decrypted attribute record of a node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Attributes {
    /// Display name of the node.
    #[serde(rename = "n")]
    pub name: String,
}

/// Encrypts an attribute record under a node key.
pub fn encode(key: &[u8; 16], attrs: &Attributes) -> Result<Vec<u8>> {
    let mut plain = ATTR_MAGIC.to_vec();
    serde_json::to_writer(&mut plain, attrs)?;

    let msg_len = plain.len();
    plain.resize(msg_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);
    let enc = Aes128CbcEnc::new(GenericArray::from_slice(key), &GenericArray::default());
    enc.encrypt_padded_mut::<ZeroPadding>(&mut plain, msg_len)
        .map_err(|_| Error::BadArgs("attribute blob"))?;
    Ok(plain)
}

/// Decrypts an attribute blob under a node key.
pub fn decode(key: &[u8; 16], data: &[u8]) -> Result<Attributes> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::BadResp("attribute blob not block aligned".into()));
    }

    let mut plain = data.to_vec();
    cbc_decrypt(key, &mut plain);
    if &plain[..4] != ATTR_MAGIC {
        return Err(Error::BadResp("attribute blob missing magic".into()));
    }

    // JSON runs from the magic to the first padding NUL
    let end = plain.iter().position(|&b| b == 0).unwrap_or(plain.len());
    Ok(serde_json::from_slice(&plain[4..end])?)
}

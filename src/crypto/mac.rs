//! Chained CBC content authenticator.
//!
//! Every file carries a 64-bit authenticator derived in two stages. Each
//! chunk is zero-padded and CBC-encrypted under the content key with an IV
//! built from the file IV prefix; only the final ciphertext block is kept as
//! that chunk's MAC. The chunk MACs are then folded, in ascending start
//! offset order, through a single CBC encrypter seeded with a zero IV, and
//! the final accumulator is reduced to two words. Workers may finish chunks
//! in any order; the fold happens after the pool drains, so completion order
//! never influences the result.

use crate::crypto::cipher::{Aes128CbcEnc, BLOCK_SIZE};
use crate::crypto::words::{to_bytes, to_words};
use cipher::generic_array::GenericArray;
use cipher::{BlockEncryptMut, KeyIvInit};

/// Computes the MAC block of one chunk.
///
/// The chunk is zero-padded to a block boundary and CBC-encrypted with IV
/// `(iv0, iv1, iv0, iv1)`; only the last ciphertext block survives.
pub fn chunk_mac(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> [u8; 16] {
    let mut mac_iv = [0u8; 16];
    mac_iv[..8].copy_from_slice(&iv[..8]);
    mac_iv[8..].copy_from_slice(&iv[..8]);

    let mut enc = Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(&mac_iv));
    let mut last = [0u8; 16];
    for chunk in data.chunks(BLOCK_SIZE) {
        let mut block = [0u8; 16];
        block[..chunk.len()].copy_from_slice(chunk);
        enc.encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
        last = block;
    }
    last
}

/// Folds chunk MAC blocks into the file accumulator.
///
/// One fold instance lives per transfer; blocks must be absorbed in
/// ascending chunk start offset.
pub struct MacFold {
    enc: Aes128CbcEnc,
    acc: [u8; 16],
}

impl MacFold {
    /// Starts a fold under the file's content key, seeded with a zero IV.
    pub fn new(key: &[u8; 16]) -> Self {
        Self {
            enc: Aes128CbcEnc::new(GenericArray::from_slice(key), &GenericArray::default()),
            acc: [0u8; 16],
        }
    }

    /// Chains one chunk MAC block into the accumulator.
    pub fn absorb(&mut self, mac: &[u8; 16]) {
        let mut block = *mac;
        self.enc.encrypt_block_mut(GenericArray::from_mut_slice(&mut block));
        self.acc = block;
    }

    /// Finishes the fold and reduces the accumulator to the 64-bit MAC.
    pub fn finish(self) -> [u8; 8] {
        reduce(&self.acc)
    }
}

/// Reduces a 16-byte accumulator to the wire MAC: `(w0 ^ w1, w2 ^ w3)`.
pub fn reduce(acc: &[u8; 16]) -> [u8; 8] {
    let w = to_words(acc);
    let folded = to_bytes(&[w[0] ^ w[1], w[2] ^ w[3]]);
    let mut out = [0u8; 8];
    out.copy_from_slice(&folded);
    out
}

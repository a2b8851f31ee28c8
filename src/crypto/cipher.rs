//! AES-128 helpers shared across the crate.
//!
//! Three modes cover the whole protocol: blockwise ECB for wrapping and
//! unwrapping keys, CBC with a zero IV for attribute blobs and MAC chaining,
//! and big-endian CTR for the content stream. The CTR nonce for a chunk is
//! derived from the file IV and the chunk's absolute byte offset, so any
//! chunk can be enciphered independently of the others.

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher,
};

/// AES block length in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-128 in big-endian counter mode, the content stream cipher.
pub type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Zero-IV CBC encrypter, used by the attribute codec and the MAC chain.
pub type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// Zero-IV CBC decrypter.
pub type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Encrypts `data` in place, one independent block at a time.
///
/// Trailing bytes beyond the last full block are left untouched; callers
/// validate block alignment at the wire boundary.
pub fn ecb_encrypt(key: &[u8; 16], data: &mut [u8]) {
    let aes = Aes128::new(GenericArray::from_slice(key));
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        aes.encrypt_block(GenericArray::from_mut_slice(block));
    }
}

/// Decrypts `data` in place, one independent block at a time.
pub fn ecb_decrypt(key: &[u8; 16], data: &mut [u8]) {
    let aes = Aes128::new(GenericArray::from_slice(key));
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        aes.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

/// CBC-encrypts whole blocks in place under a zero IV.
pub fn cbc_encrypt(key: &[u8; 16], data: &mut [u8]) {
    let mut enc = Aes128CbcEnc::new(GenericArray::from_slice(key), &GenericArray::default());
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// CBC-decrypts whole blocks in place under a zero IV.
pub fn cbc_decrypt(key: &[u8; 16], data: &mut [u8]) {
    let mut dec = Aes128CbcDec::new(GenericArray::from_slice(key), &GenericArray::default());
    for block in data.chunks_exact_mut(BLOCK_SIZE) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Derives the CTR nonce for the chunk starting at byte `offset`.
///
/// The first 64 bits are the file IV prefix; the remaining 64 bits are the
/// block counter at that offset, i.e. `offset / 16` as two big-endian words.
pub fn ctr_nonce(iv: &[u8; 16], offset: u64) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[..8].copy_from_slice(&iv[..8]);
    nonce[8..12].copy_from_slice(&((offset >> 36) as u32).to_be_bytes());
    nonce[12..].copy_from_slice(&((offset >> 4) as u32).to_be_bytes());
    nonce
}

/// Applies the CTR keystream of the range starting at byte `offset`.
///
/// The keystream is a pure function of key, IV and offset, so encrypting a
/// whole file at once and encrypting it chunk by chunk produce identical
/// bytes.
pub fn ctr_transform(key: &[u8; 16], iv: &[u8; 16], offset: u64, data: &mut [u8]) {
    let nonce = ctr_nonce(iv, offset);
    let mut ctr = Aes128Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(&nonce));
    ctr.apply_keystream(data);
}

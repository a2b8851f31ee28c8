//! Password-derived key constructions.
//!
//! Two domain-specific derivations happen once per login: the password key,
//! a 65,536-round AES chain over the password chunks, and the string hash
//! that turns the account email into the 8-byte login handle. Both are
//! deliberately slow; neither is used anywhere else.

use crate::crypto::b64;
use crate::crypto::words::{to_bytes, to_words};
use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};

/// Fixed starting state of the password-key chain, as four big-endian words.
const KEY_SEED: [u32; 4] = [0x93C4_67E3, 0x7DB0_C7A4, 0xD1BE_3F81, 0x0152_CB56];

/// Rounds of the password-key chain.
const KEY_ROUNDS: usize = 0x10000;

/// Rounds of the string-hash chain.
const HASH_ROUNDS: usize = 0x4000;

/// Stretches a password into the 128-bit login key.
///
/// The UTF-8 password is cut into 16-byte zero-padded chunks; each round
/// encrypts the running state once under every chunk in order, starting from
/// a fixed constant. An empty password leaves the constant untouched.
pub fn password_key(password: &str) -> [u8; 16] {
    let ciphers: Vec<Aes128> = password
        .as_bytes()
        .chunks(16)
        .map(|chunk| {
            let mut key = [0u8; 16];
            key[..chunk.len()].copy_from_slice(chunk);
            Aes128::new(GenericArray::from_slice(&key))
        })
        .collect();

    let mut state = [0u8; 16];
    state.copy_from_slice(&to_bytes(&KEY_SEED));
    let block = GenericArray::from_mut_slice(&mut state);
    for _ in 0..KEY_ROUNDS {
        for cipher in &ciphers {
            cipher.encrypt_block(block);
        }
    }
    state
}

/// Hashes a string into its 8-byte handle under `key`, base64url-encoded.
///
/// The string's words are XOR-folded into a single block, the block is
/// encrypted 16,384 times, and words 0 and 2 of the result form the handle.
pub fn stringhash(s: &str, key: &[u8; 16]) -> String {
    let mut acc = [0u32; 4];
    for (i, word) in to_words(s.as_bytes()).into_iter().enumerate() {
        acc[i & 3] ^= word;
    }

    let mut state = [0u8; 16];
    state.copy_from_slice(&to_bytes(&acc));
    let aes = Aes128::new(GenericArray::from_slice(key));
    let block = GenericArray::from_mut_slice(&mut state);
    for _ in 0..HASH_ROUNDS {
        aes.encrypt_block(block);
    }

    let folded = to_words(&state);
    b64::encode(&to_bytes(&[folded[0], folded[2]]))
}

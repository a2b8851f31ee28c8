//! 32-bit-word view of byte strings.
//!
//! All key material in the protocol is manipulated as sequences of big-endian
//! 32-bit words: keys are XOR-folded word-wise, MACs are reduced word-wise,
//! and CTR nonces are assembled from words. Conversion is a bijection for
//! byte strings whose length is a multiple of four; encoding a ragged tail
//! zero-pads the final word, which is what the string-hash fold relies on.

/// Converts bytes to big-endian words, zero-padding a trailing partial word.
pub fn to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_be_bytes(word)
        })
        .collect()
}

/// Converts big-endian words back to bytes. Exact inverse of [`to_words`]
/// for inputs whose length is a multiple of four.
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

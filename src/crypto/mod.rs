//! Cryptographic primitives and codecs.
//!
//! Everything in this tree is a leaf used by the rest of the crate: the
//! word/byte bijection all key material is manipulated through, the URL-safe
//! base64 wire encoding, the password-derived key constructions, the AES
//! helpers (ECB key wrapping, zero-IV CBC, CTR content streaming), the
//! chained CBC content authenticator, the node attribute codec, and the RSA
//! session-challenge decryption used once at login.

pub mod attrs;
pub mod b64;
pub mod cipher;
pub mod kdf;
pub mod mac;
pub mod rsa;
pub mod words;

//! RSA session-challenge decryption.
//!
//! Used exactly once, at login: the server answers the `us` command with an
//! RSA private key wrapped under the master key and a session challenge
//! encrypted to that key. Integers travel as MPIs, a two-byte big-endian bit
//! length followed by the magnitude. The private key blob holds `(p, q, d,
//! u)`; the challenge plaintext is `c^d mod (p*q)`, and its leading bytes
//! carry the session id.

use crate::libs::error::{Error, Result};
use num_bigint::BigUint;

/// Parses one MPI, returning the integer and the remaining bytes.
fn read_mpi(data: &[u8]) -> Result<(BigUint, &[u8])> {
    if data.len() < 2 {
        return Err(Error::BadResp("truncated MPI header".into()));
    }
    let bits = u16::from_be_bytes([data[0], data[1]]) as usize;
    let len = bits.div_ceil(8);
    if data.len() < 2 + len {
        return Err(Error::BadResp("truncated MPI body".into()));
    }
    Ok((BigUint::from_bytes_be(&data[2..2 + len]), &data[2 + len..]))
}

/// Decrypts the session challenge with the unwrapped private key blob.
///
/// `privk` is the ECB-decrypted private key (four MPIs); `csid` is the
/// decoded challenge (one MPI). Returns the challenge plaintext, leading
/// zeros stripped.
pub fn decrypt_session_challenge(privk: &[u8], csid: &[u8]) -> Result<Vec<u8>> {
    let (p, rest) = read_mpi(privk)?;
    let (q, rest) = read_mpi(rest)?;
    let (d, rest) = read_mpi(rest)?;
    let (_u, _) = read_mpi(rest)?;
    let (challenge, _) = read_mpi(csid)?;

    let modulus = &p * &q;
    Ok(challenge.modpow(&d, &modulus).to_bytes_be())
}

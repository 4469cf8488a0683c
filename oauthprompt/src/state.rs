//! Anti-forgery `state` nonce.

use std::fmt::Write;

use crate::error::Result;

/// Number of random bytes in a state nonce.
pub const STATE_BYTES: usize = 16;

/// Generate a state nonce: 16 bytes from the OS entropy source, hex-encoded.
///
/// A failing entropy source is returned as an error, never retried.
pub fn random_state() -> Result<String> {
    let mut buf = [0u8; STATE_BYTES];
    getrandom::getrandom(&mut buf)?;
    Ok(to_hex(&buf))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

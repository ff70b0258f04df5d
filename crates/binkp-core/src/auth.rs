//! CRAM-MD5 and plain-password authentication.
//!
//! The answering side advertises a random challenge in
//! `M_NUL OPT CRAM-MD5-<hex>`; the originating side answers with
//! `M_PWD CRAM-MD5-<hex(HMAC-MD5(secret, challenge))>`. The HMAC is spelled
//! out per RFC 2104 rather than pulled from a MAC crate so the 64-byte
//! key schedule stays visible. All comparisons of secret-derived material
//! are constant-time.

use md5::{Digest, Md5};
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Prefix of a CRAM response inside `M_PWD`, and of the challenge option.
pub const CRAM_PREFIX: &str = "CRAM-MD5-";

/// Challenge length issued by this implementation, in raw bytes.
pub const CHALLENGE_LEN: usize = 16;

const BLOCK: usize = 64;
const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5C;

/// HMAC-MD5 over the raw challenge bytes, per RFC 2104.
///
/// Secrets longer than the 64-byte block are first reduced with MD5, then
/// the key is zero-padded to the block size.
#[must_use]
pub fn hmac_md5(secret: &[u8], challenge: &[u8]) -> [u8; 16] {
    let mut key = [0u8; BLOCK];
    if secret.len() > BLOCK {
        key[..16].copy_from_slice(&Md5::digest(secret));
    } else {
        key[..secret.len()].copy_from_slice(secret);
    }

    let mut pad = [0u8; BLOCK];
    for (p, k) in pad.iter_mut().zip(key.iter()) {
        *p = k ^ IPAD;
    }
    let mut inner = Md5::new();
    inner.update(pad);
    inner.update(challenge);
    let inner_digest = inner.finalize();

    for (p, k) in pad.iter_mut().zip(key.iter()) {
        *p = k ^ OPAD;
    }
    let mut outer = Md5::new();
    outer.update(pad);
    outer.update(inner_digest);
    outer.finalize().into()
}

/// Generate a fresh random challenge.
#[must_use]
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::rng().fill_bytes(&mut challenge);
    challenge
}

/// The `M_PWD` response string for a secret and raw challenge bytes.
#[must_use]
pub fn cram_response(secret: &[u8], challenge: &[u8]) -> String {
    format!("{CRAM_PREFIX}{}", hex::encode(hmac_md5(secret, challenge)))
}

/// Extract the raw challenge bytes from a `CRAM-MD5-<hex>` option token.
/// Returns `None` when the token has a different shape or bad hex.
#[must_use]
pub fn parse_challenge(token: &str) -> Option<Vec<u8>> {
    let hex_part = token.strip_prefix(CRAM_PREFIX)?;
    hex::decode(hex_part).ok()
}

/// Constant-time byte-slice equality; length is not secret.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Verify an incoming `M_PWD` against the stored secret for the peer.
///
/// When a challenge was issued, the response must be the recomputed CRAM
/// digest; the plaintext secret is never accepted on the wire in that case.
/// With no challenge issued, a plain constant-time compare applies. An
/// absent/empty stored secret accepts anything.
#[must_use]
pub fn verify_password(stored: Option<&str>, challenge: Option<&[u8]>, received: &str) -> bool {
    let secret = match stored {
        None | Some("") => return true,
        Some(secret) => secret,
    };
    match challenge {
        Some(challenge) => {
            let expected = cram_response(secret.as_bytes(), challenge);
            ct_eq(expected.as_bytes(), received.as_bytes())
        }
        None => ct_eq(secret.as_bytes(), received.as_bytes()),
    }
}

//! Thin wrapper around the external crypto crates the rest of the core
//! builds on: XChaCha20-Poly1305 AEAD, Argon2id, BLAKE2b, X25519 and the
//! system RNG. Nothing here knows about file formats or chunking.

use crate::error::{KryptorError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::digest::{Mac, Update, VariableOutput};
use blake2::{Blake2bMac, Blake2bVar};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand_core::{CryptoRng, RngCore};

pub const KEY: usize = 32;
pub const NONCE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Argon2id parameters. These are wire-format constants: changing them
/// breaks decryption of every previously-written password-mode file, so
/// they are fixed here rather than exposed as CLI knobs.
pub const ARGON2ID_MEMORY_KIB: u32 = 256 * 1024; // 256 MiB
pub const ARGON2ID_ITERATIONS: u32 = 12;
pub const ARGON2ID_PARALLELISM: u32 = 1;

/// Seal `plaintext` under `key`/`nonce` with associated data `ad`.
/// Output is `plaintext.len() + TAG_SIZE` bytes.
pub fn aead_seal(key: &[u8; KEY], nonce: &[u8; NONCE], plaintext: &[u8], ad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| KryptorError::Internal("invalid AEAD key length".into()))?;
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad: ad })
        .map_err(|_| KryptorError::Internal("AEAD seal failed".into()))
}

/// Open `ciphertext` under `key`/`nonce`/`ad`. Returns `TamperOrWrongKey` on
/// any authentication failure; never returns partial plaintext.
pub fn aead_open(key: &[u8; KEY], nonce: &[u8; NONCE], ciphertext: &[u8], ad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| KryptorError::Internal("invalid AEAD key length".into()))?;
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| KryptorError::TamperOrWrongKey)
}

/// Fill `buf` with cryptographically secure random bytes from the supplied
/// RNG. Generic over the RNG so tests can inject a seeded, deterministic
/// generator (spec property: "determinism under fixed RNG").
pub fn random_bytes<R: RngCore + CryptoRng>(rng: &mut R, buf: &mut [u8]) {
    rng.fill_bytes(buf);
}

/// Argon2id with the fixed parameters above. `out_len` is almost always 32
/// (a KEK), but left generic for completeness.
pub fn argon2id(password: &[u8], salt: &[u8; 16], out_len: usize) -> Result<Vec<u8>> {
    let params = Params::new(ARGON2ID_MEMORY_KIB, ARGON2ID_ITERATIONS, ARGON2ID_PARALLELISM, Some(out_len))
        .map_err(|e| KryptorError::Internal(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = vec![0u8; out_len];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| KryptorError::Internal(format!("argon2 derive: {e}")))?;
    Ok(out)
}

/// BLAKE2b, optionally keyed. `out_len` must be in `1..=64` for the unkeyed
/// (plain hash) path. The keyed path always produces 32 bytes — the only
/// output size any caller in this crate needs (every KEK-mixing call in
/// `derivation.rs` wants 32) — since `blake2`'s keyed MAC, `Blake2bMac`, is a
/// compile-time-sized wrapper with no runtime-`usize`-output equivalent.
pub fn blake2b(key: Option<&[u8]>, input: &[u8], out_len: usize) -> Result<Vec<u8>> {
    match key {
        Some(k) => {
            if out_len != 32 {
                return Err(KryptorError::Internal("keyed blake2b only supports a 32-byte output".into()));
            }
            let mut mac = Blake2bMac::<U32>::new_from_slice(k)
                .map_err(|e| KryptorError::Internal(format!("blake2b keyed init: {e}")))?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        None => {
            let mut hasher = Blake2bVar::new(out_len)
                .map_err(|e| KryptorError::Internal(format!("blake2b init: {e}")))?;
            hasher.update(input);
            let mut out = vec![0u8; out_len];
            hasher
                .finalize_variable(&mut out)
                .map_err(|e| KryptorError::Internal(format!("blake2b finalize: {e}")))?;
            Ok(out)
        }
    }
}

/// X25519 scalar multiplication: `scalar` is a clamped private key,
/// `point` is the peer's public key.
pub fn x25519(scalar: &[u8; 32], point: &[u8; 32]) -> [u8; 32] {
    let sk = x25519_dalek::StaticSecret::from(*scalar);
    let pk = x25519_dalek::PublicKey::from(*point);
    *sk.diffie_hellman(&pk).as_bytes()
}

/// Derive the public key matching a clamped X25519 private scalar.
pub fn x25519_public(scalar: &[u8; 32]) -> [u8; 32] {
    let sk = x25519_dalek::StaticSecret::from(*scalar);
    *x25519_dalek::PublicKey::from(&sk).as_bytes()
}

pub use crate::security::zero;

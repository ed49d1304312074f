//! Bridges passwords, symmetric keys and X25519 key exchange into a
//! 32-byte Key-Encryption-Key (KEK). See spec.md S4.2.

use crate::error::{KryptorError, Result};
use crate::primitives::{argon2id, blake2b, x25519, x25519_public};
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;
use zeroize::Zeroizing;

/// A 32-byte optional pre-shared symmetric key mixed into asymmetric KEK
/// derivation. Zero-padded when absent, always present in the transcript so
/// presence/absence is authenticated.
pub type PreSharedKey = [u8; 32];

const ZERO_PSK: PreSharedKey = [0u8; 32];

fn psk_bytes(psk: Option<&PreSharedKey>) -> PreSharedKey {
    *psk.unwrap_or(&ZERO_PSK)
}

/// Key material supplied by the sender at encryption time.
pub enum EncryptKeyMode {
    Password {
        password: Zeroizing<Vec<u8>>,
        pre_shared_key: Option<PreSharedKey>,
    },
    SymmetricKey(Zeroizing<[u8; 32]>),
    /// Private(sender) -> Public(recipient). A fresh ephemeral X25519
    /// keypair is generated per file; its public half is embedded in the
    /// header and its secret half is discarded immediately after use.
    Asymmetric {
        sender_sk: Zeroizing<[u8; 32]>,
        recipient_pk: [u8; 32],
        pre_shared_key: Option<PreSharedKey>,
    },
}

impl EncryptKeyMode {
    /// Self-encryption: recipient_pk is derived from the sender's own key.
    pub fn self_encrypt(sender_sk: Zeroizing<[u8; 32]>, pre_shared_key: Option<PreSharedKey>) -> Self {
        let recipient_pk = x25519_public(&sender_sk);
        EncryptKeyMode::Asymmetric { sender_sk, recipient_pk, pre_shared_key }
    }
}

/// Key material supplied by the recipient at decryption time.
pub enum DecryptKeyMode {
    Password {
        password: Zeroizing<Vec<u8>>,
        pre_shared_key: Option<PreSharedKey>,
    },
    SymmetricKey(Zeroizing<[u8; 32]>),
    Asymmetric {
        recipient_sk: Zeroizing<[u8; 32]>,
        sender_pk: [u8; 32],
        pre_shared_key: Option<PreSharedKey>,
    },
}

impl DecryptKeyMode {
    pub fn self_decrypt(recipient_sk: Zeroizing<[u8; 32]>, pre_shared_key: Option<PreSharedKey>) -> Self {
        let sender_pk = x25519_public(&recipient_sk);
        DecryptKeyMode::Asymmetric { recipient_sk, sender_pk, pre_shared_key }
    }
}

/// Result of KEK derivation: the KEK itself, and (for asymmetric-sender
/// mode only) the ephemeral public key to persist in the header. Zero for
/// every other mode, matching HeaderCodec's "32 zero bytes for non-
/// asymmetric modes" convention.
pub struct DerivedKek {
    pub kek: Zeroizing<[u8; 32]>,
    pub ephemeral_public_key: [u8; 32],
}

fn asymmetric_transcript(s1: &[u8; 32], s2: &[u8; 32], epk: &[u8; 32], recipient_pk: &[u8; 32], psk: &PreSharedKey) -> Result<Zeroizing<[u8; 32]>> {
    let mut ikm = Vec::with_capacity(32 * 5);
    ikm.extend_from_slice(s1);
    ikm.extend_from_slice(s2);
    ikm.extend_from_slice(epk);
    ikm.extend_from_slice(recipient_pk);
    ikm.extend_from_slice(psk);
    let mut kek = blake2b(None, &ikm, 32)?;
    ikm.zeroize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&kek);
    kek.zeroize();
    Ok(Zeroizing::new(out))
}

/// Derive the KEK for encryption. `header_nonce` is the file's freshly
/// sampled 24-byte nonce (doubles as the Argon2id salt's first 16 bytes).
pub fn derive_kek_for_encrypt<R: RngCore + CryptoRng>(
    mode: &EncryptKeyMode,
    header_nonce: &[u8; 24],
    rng: &mut R,
) -> Result<DerivedKek> {
    match mode {
        EncryptKeyMode::Password { password, pre_shared_key } => {
            let mut salt = [0u8; 16];
            salt.copy_from_slice(&header_nonce[..16]);
            let mut kek = argon2id(password, &salt, 32)?;
            let pepper = psk_bytes(pre_shared_key.as_ref());
            let mut mixed = blake2b(Some(&kek), &pepper, 32)?;
            kek.zeroize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&mixed);
            mixed.zeroize();
            Ok(DerivedKek { kek: Zeroizing::new(out), ephemeral_public_key: [0u8; 32] })
        }
        EncryptKeyMode::SymmetricKey(symmetric_key) => {
            let mut mixed = blake2b(Some(symmetric_key.as_ref()), header_nonce, 32)?;
            let mut out = [0u8; 32];
            out.copy_from_slice(&mixed);
            mixed.zeroize();
            Ok(DerivedKek { kek: Zeroizing::new(out), ephemeral_public_key: [0u8; 32] })
        }
        EncryptKeyMode::Asymmetric { sender_sk, recipient_pk, pre_shared_key } => {
            let mut esk = Zeroizing::new([0u8; 32]);
            rng.fill_bytes(esk.as_mut());
            let epk = x25519_public(&esk);
            let s1 = x25519(&esk, recipient_pk);
            let s2 = x25519(sender_sk, recipient_pk);
            esk.zeroize();
            let psk = psk_bytes(pre_shared_key.as_ref());
            let kek = asymmetric_transcript(&s1, &s2, &epk, recipient_pk, &psk)?;
            Ok(DerivedKek { kek, ephemeral_public_key: epk })
        }
    }
}

/// Derive the KEK for decryption. `epk` is the ephemeral public key read
/// back from the file header (ignored for non-asymmetric modes).
pub fn derive_kek_for_decrypt(
    mode: &DecryptKeyMode,
    header_nonce: &[u8; 24],
    epk: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>> {
    match mode {
        DecryptKeyMode::Password { password, pre_shared_key } => {
            let mut salt = [0u8; 16];
            salt.copy_from_slice(&header_nonce[..16]);
            let mut kek = argon2id(password, &salt, 32)?;
            let pepper = psk_bytes(pre_shared_key.as_ref());
            let mut mixed = blake2b(Some(&kek), &pepper, 32)?;
            kek.zeroize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&mixed);
            mixed.zeroize();
            Ok(Zeroizing::new(out))
        }
        DecryptKeyMode::SymmetricKey(symmetric_key) => {
            let mut mixed = blake2b(Some(symmetric_key.as_ref()), header_nonce, 32)?;
            let mut out = [0u8; 32];
            out.copy_from_slice(&mixed);
            mixed.zeroize();
            Ok(Zeroizing::new(out))
        }
        DecryptKeyMode::Asymmetric { recipient_sk, sender_pk, pre_shared_key } => {
            let s1 = x25519(recipient_sk, epk);
            let s2 = x25519(recipient_sk, sender_pk);
            // The sealed side used recipient_pk (its own public key) as the
            // fourth transcript item; the recipient recomputes the same
            // value from its own secret key.
            let recipient_pk = x25519_public(recipient_sk);
            let psk = psk_bytes(pre_shared_key.as_ref());
            asymmetric_transcript(&s1, &s2, epk, &recipient_pk, &psk)
        }
    }
}

/// Fail loudly rather than silently accept an empty password at encrypt
/// time (spec S6: `PasswordProvider.get()` "never empty on encrypt").
pub fn validate_password_nonempty(password: &[u8]) -> Result<()> {
    if password.is_empty() {
        return Err(KryptorError::Validation("password must not be empty".into()));
    }
    Ok(())
}

//! Fixed on-disk header layout (spec.md S3) and its codec.
//!
//! ```text
//! [magic 4B][format_version 2B][ephemeral_public_key 32B][header_nonce 24B]
//! [encrypted_inner_header 312B]
//! ```
//!
//! The inner header, once decrypted, is a fixed-length struct (never a
//! variable-length/serde-encoded blob) so offsets are stable across
//! versions:
//!
//! ```text
//! [padding_length 4B][is_directory 1B][file_name_length 4B]
//! [file_name_bytes 255B][data_encryption_key 32B]
//! ```

use crate::error::{KryptorError, Result};
use crate::primitives::{aead_open, aead_seal, KEY, NONCE, TAG_SIZE};
use zeroize::Zeroizing;

pub const MAGIC: [u8; 4] = *b"KRY1";
pub const FORMAT_VERSION: u16 = 1;
pub const FILE_NAME_MAX: usize = 255;
pub const CHUNK_SIZE: usize = 16 * 1024;

const MAGIC_LEN: usize = 4;
const FORMAT_VERSION_LEN: usize = 2;
const EPK_LEN: usize = 32;
const HEADER_NONCE_LEN: usize = NONCE;
pub const PREFIX_LEN: usize = MAGIC_LEN + FORMAT_VERSION_LEN + EPK_LEN + HEADER_NONCE_LEN;

// Inner header field offsets, documented once here rather than re-derived
// at each call site (spec.md S9 open question).
const OFF_PADDING_LEN: usize = 0;
const OFF_IS_DIRECTORY: usize = OFF_PADDING_LEN + 4;
const OFF_NAME_LEN: usize = OFF_IS_DIRECTORY + 1;
const OFF_NAME: usize = OFF_NAME_LEN + 4;
const OFF_DEK: usize = OFF_NAME + FILE_NAME_MAX;
pub const INNER_HEADER_LEN: usize = OFF_DEK + KEY;
pub const ENCRYPTED_INNER_HEADER_LEN: usize = INNER_HEADER_LEN + TAG_SIZE;
pub const FIXED_HEADER_LEN: usize = PREFIX_LEN + ENCRYPTED_INNER_HEADER_LEN;

/// The plaintext inner header, before AEAD sealing under the KEK.
pub struct InnerHeader {
    pub padding_length: u32,
    pub is_directory: bool,
    pub file_name: String,
    pub data_encryption_key: Zeroizing<[u8; 32]>,
}

impl InnerHeader {
    fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut buf = vec![0u8; INNER_HEADER_LEN];
        buf[OFF_PADDING_LEN..OFF_PADDING_LEN + 4].copy_from_slice(&self.padding_length.to_le_bytes());
        buf[OFF_IS_DIRECTORY] = self.is_directory as u8;

        let name_bytes = self.file_name.as_bytes();
        let name_len = if name_bytes.len() <= FILE_NAME_MAX {
            name_bytes.len()
        } else {
            // Truncate at the last UTF-8 char boundary at or before
            // FILE_NAME_MAX so the stored bytes are always valid UTF-8.
            (0..=FILE_NAME_MAX).rev().find(|&i| self.file_name.is_char_boundary(i)).unwrap_or(0)
        };
        buf[OFF_NAME_LEN..OFF_NAME_LEN + 4].copy_from_slice(&(name_len as u32).to_le_bytes());
        buf[OFF_NAME..OFF_NAME + name_len].copy_from_slice(&name_bytes[..name_len]);
        // remaining name bytes stay zero (Vec is zero-initialized above)

        buf[OFF_DEK..OFF_DEK + KEY].copy_from_slice(self.data_encryption_key.as_ref());
        Zeroizing::new(buf)
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != INNER_HEADER_LEN {
            return Err(KryptorError::Internal("inner header has the wrong length".into()));
        }
        let padding_length = u32::from_le_bytes(buf[OFF_PADDING_LEN..OFF_PADDING_LEN + 4].try_into().unwrap());
        let is_directory = buf[OFF_IS_DIRECTORY] != 0;
        let name_len = u32::from_le_bytes(buf[OFF_NAME_LEN..OFF_NAME_LEN + 4].try_into().unwrap()) as usize;
        if name_len > FILE_NAME_MAX {
            return Err(KryptorError::TamperOrWrongKey);
        }
        let file_name = String::from_utf8(buf[OFF_NAME..OFF_NAME + name_len].to_vec())
            .map_err(|_| KryptorError::TamperOrWrongKey)?;
        let mut dek = [0u8; KEY];
        dek.copy_from_slice(&buf[OFF_DEK..OFF_DEK + KEY]);
        Ok(InnerHeader { padding_length, is_directory, file_name, data_encryption_key: Zeroizing::new(dek) })
    }
}

/// Result of parsing the public (unencrypted) prefix of a file, before the
/// KEK is known.
pub struct HeaderPrefix {
    pub ephemeral_public_key: [u8; 32],
    pub header_nonce: [u8; 24],
}

/// Parse and validate the fixed, unencrypted prefix. Returns
/// `UnsupportedFormat` on a magic or version mismatch, per spec.md S4.3's
/// version policy ("an older or newer version yields UnsupportedFormat").
pub fn parse_prefix(buf: &[u8]) -> Result<HeaderPrefix> {
    if buf.len() < PREFIX_LEN {
        return Err(KryptorError::UnsupportedFormat);
    }
    let magic = &buf[0..4];
    let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
    if !crate::security::constant_time_eq(magic, &MAGIC) || version != FORMAT_VERSION {
        return Err(KryptorError::UnsupportedFormat);
    }
    let mut ephemeral_public_key = [0u8; 32];
    ephemeral_public_key.copy_from_slice(&buf[6..38]);
    let mut header_nonce = [0u8; 24];
    header_nonce.copy_from_slice(&buf[38..62]);
    Ok(HeaderPrefix { ephemeral_public_key, header_nonce })
}

fn associated_data(ciphertext_body_length: u64, ephemeral_public_key: &[u8; 32]) -> Vec<u8> {
    let mut ad = Vec::with_capacity(8 + MAGIC_LEN + FORMAT_VERSION_LEN + EPK_LEN);
    ad.extend_from_slice(&ciphertext_body_length.to_le_bytes());
    ad.extend_from_slice(&MAGIC);
    ad.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    ad.extend_from_slice(ephemeral_public_key);
    ad
}

/// Build the full fixed-length header (`FIXED_HEADER_LEN` bytes) ready to
/// write at the start of the output file.
pub fn seal_header(
    kek: &[u8; 32],
    header_nonce: &[u8; 24],
    ephemeral_public_key: &[u8; 32],
    inner: &InnerHeader,
    ciphertext_body_length: u64,
) -> Result<Vec<u8>> {
    let ad = associated_data(ciphertext_body_length, ephemeral_public_key);
    let inner_bytes = inner.to_bytes();
    let encrypted_inner = aead_seal(kek, header_nonce, &inner_bytes, &ad)?;
    debug_assert_eq!(encrypted_inner.len(), ENCRYPTED_INNER_HEADER_LEN);

    let mut out = Vec::with_capacity(FIXED_HEADER_LEN);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(ephemeral_public_key);
    out.extend_from_slice(header_nonce);
    out.extend_from_slice(&encrypted_inner);
    Ok(out)
}

/// Open the encrypted inner header given the already-parsed prefix and a
/// KEK derived for it. `ciphertext_body_length` is `file_length -
/// FIXED_HEADER_LEN`, computed by the caller from the file's actual size.
pub fn open_header(
    kek: &[u8; 32],
    prefix: &HeaderPrefix,
    encrypted_inner: &[u8],
    ciphertext_body_length: u64,
) -> Result<InnerHeader> {
    if encrypted_inner.len() != ENCRYPTED_INNER_HEADER_LEN {
        return Err(KryptorError::TamperOrWrongKey);
    }
    let ad = associated_data(ciphertext_body_length, &prefix.ephemeral_public_key);
    let mut inner_bytes = aead_open(kek, &prefix.header_nonce, encrypted_inner, &ad)?;
    let inner = InnerHeader::from_bytes(&inner_bytes);
    crate::security::zero(&mut inner_bytes);
    inner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_header_round_trips_through_bytes() {
        let inner = InnerHeader {
            padding_length: 42,
            is_directory: true,
            file_name: "résumé.txt".to_string(),
            data_encryption_key: Zeroizing::new([7u8; 32]),
        };
        let bytes = inner.to_bytes();
        let parsed = InnerHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.padding_length, 42);
        assert!(parsed.is_directory);
        assert_eq!(parsed.file_name, "résumé.txt");
        assert_eq!(*parsed.data_encryption_key, [7u8; 32]);
    }

    #[test]
    fn file_name_longer_than_max_is_truncated_on_encode() {
        let long_name: String = "a".repeat(300);
        let inner = InnerHeader {
            padding_length: 0,
            is_directory: false,
            file_name: long_name.clone(),
            data_encryption_key: Zeroizing::new([0u8; 32]),
        };
        let bytes = inner.to_bytes();
        let parsed = InnerHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.file_name.len(), FILE_NAME_MAX);
        assert_eq!(parsed.file_name, "a".repeat(FILE_NAME_MAX));
    }

    #[test]
    fn seal_then_open_round_trips() {
        let kek = [5u8; 32];
        let header_nonce = [1u8; 24];
        let epk = [0u8; 32];
        let inner = InnerHeader {
            padding_length: 10,
            is_directory: false,
            file_name: "a.txt".to_string(),
            data_encryption_key: Zeroizing::new([9u8; 32]),
        };
        let body_len = 4096u64;
        let sealed = seal_header(&kek, &header_nonce, &epk, &inner, body_len).unwrap();
        assert_eq!(sealed.len(), FIXED_HEADER_LEN);

        let prefix = parse_prefix(&sealed).unwrap();
        let encrypted_inner = &sealed[PREFIX_LEN..];
        let opened = open_header(&kek, &prefix, encrypted_inner, body_len).unwrap();
        assert_eq!(opened.file_name, "a.txt");
        assert_eq!(*opened.data_encryption_key, [9u8; 32]);
    }

    #[test]
    fn wrong_format_version_is_rejected() {
        let mut buf = vec![0u8; PREFIX_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        let err = parse_prefix(&buf).unwrap_err();
        assert!(matches!(err, KryptorError::UnsupportedFormat));
    }

    #[test]
    fn tampered_body_length_in_ad_fails_open() {
        let kek = [5u8; 32];
        let header_nonce = [1u8; 24];
        let epk = [0u8; 32];
        let inner = InnerHeader {
            padding_length: 0,
            is_directory: false,
            file_name: "x".to_string(),
            data_encryption_key: Zeroizing::new([1u8; 32]),
        };
        let sealed = seal_header(&kek, &header_nonce, &epk, &inner, 100).unwrap();
        let prefix = parse_prefix(&sealed).unwrap();
        let encrypted_inner = &sealed[PREFIX_LEN..];
        let err = open_header(&kek, &prefix, encrypted_inner, 101).unwrap_err();
        assert!(matches!(err, KryptorError::TamperOrWrongKey));
    }
}

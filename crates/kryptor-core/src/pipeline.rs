//! Streams plaintext to ciphertext (and back) in fixed-size authenticated
//! chunks, each sealed under the `DEK` with a nonce derived by incrementing
//! the file's `header_nonce`. See spec.md S4.4.

use crate::error::{KryptorError, Result};
use crate::header::CHUNK_SIZE;
use crate::primitives::{aead_open, aead_seal, TAG_SIZE};
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt};
use zeroize::Zeroizing;

pub const CIPHERTEXT_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_SIZE;

/// Little-endian 192-bit increment. Wraparound is disallowed by spec (file
/// length would have to exceed 2^192 chunks); treated as an internal error
/// rather than a silent wrap.
pub fn increment_nonce(nonce: &[u8; 24]) -> Result<[u8; 24]> {
    let mut out = *nonce;
    let mut carry: u16 = 1;
    for byte in out.iter_mut() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u16 + carry;
        *byte = sum as u8;
        carry = sum >> 8;
    }
    if carry != 0 {
        return Err(KryptorError::Internal("chunk nonce counter overflowed".into()));
    }
    Ok(out)
}

/// Number of `CHUNK_SIZE`-sized plaintext windows needed to hold
/// `plaintext_size` bytes. An empty file still takes one (all-padding)
/// chunk, matching spec.md S8 scenario S1.
pub fn chunk_count_for(plaintext_size: u64) -> u64 {
    if plaintext_size == 0 {
        1
    } else {
        (plaintext_size + CHUNK_SIZE as u64 - 1) / CHUNK_SIZE as u64
    }
}

pub fn padding_length_for(plaintext_size: u64) -> u32 {
    let count = chunk_count_for(plaintext_size);
    (count * CHUNK_SIZE as u64 - plaintext_size) as u32
}

/// A cooperative cancellation check, polled between chunks (spec.md S5).
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> CancelSignal for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

pub struct NoCancel;
impl CancelSignal for NoCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Encrypt exactly `plaintext_size` bytes read from `input` into `output`,
/// chunk by chunk. Returns the padding length that was recorded, so the
/// caller can store it in the inner header before this is invoked (the
/// value is deterministic from `plaintext_size` alone, but returned for
/// convenience/assertion).
pub async fn encrypt_chunks<R: AsyncRead + Unpin>(
    input: &mut R,
    output: &mut std::fs::File,
    dek: &Zeroizing<[u8; 32]>,
    header_nonce: &[u8; 24],
    plaintext_size: u64,
    cancel: &dyn CancelSignal,
) -> Result<u32> {
    let chunk_count = chunk_count_for(plaintext_size);
    let padding_length = padding_length_for(plaintext_size);

    let mut nonce = *header_nonce;
    let mut remaining = plaintext_size;
    let mut buf = vec![0u8; CHUNK_SIZE];

    for _ in 0..chunk_count {
        if cancel.is_cancelled() {
            return Err(KryptorError::Cancelled);
        }
        nonce = increment_nonce(&nonce)?;

        let take = remaining.min(CHUNK_SIZE as u64) as usize;
        if take > 0 {
            input
                .read_exact(&mut buf[..take])
                .await
                .map_err(|e| KryptorError::io("<input>", e))?;
        }
        for b in buf[take..].iter_mut() {
            *b = 0;
        }

        let ct = aead_seal(dek, &nonce, &buf, b"")?;
        output.write_all(&ct).map_err(|e| KryptorError::io("<output>", e))?;
        remaining -= take as u64;
    }

    crate::security::zero(&mut buf);
    output.sync_all().map_err(|e| KryptorError::io("<output>", e))?;
    Ok(padding_length)
}

/// Decrypt `ciphertext_body_length` bytes of chunked ciphertext from
/// `input` into `output`, then truncate `output` by `padding_length` bytes.
pub async fn decrypt_chunks<R: AsyncRead + Unpin>(
    input: &mut R,
    output: &mut std::fs::File,
    dek: &Zeroizing<[u8; 32]>,
    header_nonce: &[u8; 24],
    ciphertext_body_length: u64,
    padding_length: u32,
    cancel: &dyn CancelSignal,
) -> Result<()> {
    if ciphertext_body_length % CIPHERTEXT_CHUNK_SIZE as u64 != 0 {
        return Err(KryptorError::TamperOrWrongKey);
    }
    let total_chunks = ciphertext_body_length / CIPHERTEXT_CHUNK_SIZE as u64;
    if total_chunks == 0 || (padding_length as u64) >= CHUNK_SIZE as u64 {
        return Err(KryptorError::TamperOrWrongKey);
    }

    let mut nonce = *header_nonce;
    let mut buf = vec![0u8; CIPHERTEXT_CHUNK_SIZE];
    let mut written: u64 = 0;

    for _ in 0..total_chunks {
        if cancel.is_cancelled() {
            return Err(KryptorError::Cancelled);
        }
        nonce = increment_nonce(&nonce)?;

        match input.read_exact(&mut buf).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(KryptorError::TamperOrWrongKey)
            }
            Err(e) => return Err(KryptorError::io("<input>", e)),
        }

        let pt = aead_open(dek, &nonce, &buf, b"")?;
        output.write_all(&pt).map_err(|e| KryptorError::io("<output>", e))?;
        written += pt.len() as u64;
    }

    crate::security::zero(&mut buf);
    output.sync_all().map_err(|e| KryptorError::io("<output>", e))?;
    output
        .set_len(written - padding_length as u64)
        .map_err(|e| KryptorError::io("<output>", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_increments_little_endian() {
        let n0 = [0u8; 24];
        let n1 = increment_nonce(&n0).unwrap();
        assert_eq!(n1[0], 1);
        assert!(n1[1..].iter().all(|&b| b == 0));

        let mut n = [0xffu8; 24];
        n[0] = 0xfe;
        let carried = increment_nonce(&n).unwrap();
        assert_eq!(carried[0], 0xff);
        assert!(carried[1..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn nonce_overflow_is_rejected() {
        let max = [0xffu8; 24];
        assert!(increment_nonce(&max).is_err());
    }

    #[test]
    fn chunk_count_matches_spec_boundaries() {
        assert_eq!(chunk_count_for(0), 1);
        assert_eq!(padding_length_for(0), CHUNK_SIZE as u32);
        assert_eq!(chunk_count_for(CHUNK_SIZE as u64 - 1), 1);
        assert_eq!(chunk_count_for(CHUNK_SIZE as u64), 1);
        assert_eq!(padding_length_for(CHUNK_SIZE as u64), 0);
        assert_eq!(chunk_count_for(CHUNK_SIZE as u64 + 1), 2);
        assert_eq!(chunk_count_for(10 * CHUNK_SIZE as u64), 10);
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trips_exact_chunk() {
        let dek = Zeroizing::new([3u8; 32]);
        let header_nonce = [4u8; 24];
        let plaintext = vec![0x41u8; CHUNK_SIZE];

        let mut enc_out = tempfile::tempfile().unwrap();
        {
            let mut cursor = std::io::Cursor::new(plaintext.clone());
            let padding = encrypt_chunks(&mut cursor, &mut enc_out, &dek, &header_nonce, plaintext.len() as u64, &NoCancel)
                .await
                .unwrap();
            assert_eq!(padding, 0);
        }

        use std::io::{Seek, SeekFrom};
        enc_out.seek(SeekFrom::Start(0)).unwrap();
        let body_len = enc_out.metadata().unwrap().len();
        assert_eq!(body_len, CIPHERTEXT_CHUNK_SIZE as u64);

        let mut dec_out = tempfile::tempfile().unwrap();
        let mut async_in = tokio::fs::File::from_std(enc_out);
        decrypt_chunks(&mut async_in, &mut dec_out, &dek, &header_nonce, body_len, 0, &NoCancel)
            .await
            .unwrap();

        dec_out.seek(SeekFrom::Start(0)).unwrap();
        let mut result = Vec::new();
        std::io::Read::read_to_end(&mut dec_out, &mut result).unwrap();
        assert_eq!(result, plaintext);
    }
}

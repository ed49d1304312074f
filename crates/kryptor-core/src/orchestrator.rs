//! Drives a single file (or directory) through key derivation, header
//! sealing and the chunk pipeline end to end. See spec.md S4.5.

use crate::archive::{ArchivePacker, TarArchivePacker};
use crate::derivation::{derive_kek_for_decrypt, derive_kek_for_encrypt, validate_password_nonempty, DecryptKeyMode, EncryptKeyMode};
use crate::error::{KryptorError, Result};
use crate::header::{self, HeaderPrefix, InnerHeader, FIXED_HEADER_LEN};
use crate::pipeline::{self, decrypt_chunks, encrypt_chunks, CancelSignal, NoCancel, CIPHERTEXT_CHUNK_SIZE};
use crate::primitives::{random_bytes, KEY};
use rand_core::{CryptoRng, RngCore};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const OUTPUT_EXTENSION: &str = "kryptor";

/// Per-call options (spec.md S4.5). Not crate-wide configuration: every
/// `encrypt_file`/`decrypt_file` call takes its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub overwrite_input: bool,
    pub encrypt_file_names: bool,
}

pub struct FileOrchestrator {
    packer: Box<dyn ArchivePacker + Send + Sync>,
}

impl Default for FileOrchestrator {
    fn default() -> Self {
        FileOrchestrator { packer: Box::new(TarArchivePacker) }
    }
}

impl FileOrchestrator {
    pub fn new(packer: Box<dyn ArchivePacker + Send + Sync>) -> Self {
        FileOrchestrator { packer }
    }

    pub async fn encrypt_file<R: RngCore + CryptoRng>(
        &self,
        input_path: &Path,
        mode: &EncryptKeyMode,
        opts: &Options,
        rng: &mut R,
    ) -> Result<PathBuf> {
        self.encrypt_file_cancellable(input_path, mode, opts, rng, &NoCancel).await
    }

    pub async fn encrypt_file_cancellable<R: RngCore + CryptoRng>(
        &self,
        input_path: &Path,
        mode: &EncryptKeyMode,
        opts: &Options,
        rng: &mut R,
        cancel: &dyn CancelSignal,
    ) -> Result<PathBuf> {
        if !input_path.exists() {
            return Err(KryptorError::Validation(format!("{} does not exist", input_path.display())));
        }

        let is_directory = input_path.is_dir();
        let (plaintext_path, packed_archive, original_name) = if is_directory {
            let archive_path = self.packer.pack(input_path)?;
            let name = input_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (archive_path.clone(), Some(archive_path), name)
        } else {
            let name = input_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (input_path.to_path_buf(), None, name)
        };

        let result = self
            .encrypt_prepared(&plaintext_path, is_directory, &original_name, mode, opts, rng, cancel)
            .await;

        if let Some(archive) = &packed_archive {
            let _ = std::fs::remove_file(archive);
        }

        let output_path = result?;

        if opts.overwrite_input {
            std::fs::remove_dir_all(input_path)
                .or_else(|_| std::fs::remove_file(input_path))
                .map_err(|e| KryptorError::io(input_path, e))?;
        }

        info!(output = %output_path.display(), "encryption complete");
        Ok(output_path)
    }

    #[allow(clippy::too_many_arguments)]
    async fn encrypt_prepared<R: RngCore + CryptoRng>(
        &self,
        plaintext_path: &Path,
        is_directory: bool,
        original_name: &str,
        mode: &EncryptKeyMode,
        opts: &Options,
        rng: &mut R,
        cancel: &dyn CancelSignal,
    ) -> Result<PathBuf> {
        if let EncryptKeyMode::Password { password, .. } = mode {
            validate_password_nonempty(password)?;
        }

        let plaintext_size = std::fs::metadata(plaintext_path).map_err(|e| KryptorError::io(plaintext_path, e))?.len();

        let mut header_nonce = [0u8; 24];
        random_bytes(rng, &mut header_nonce);

        let derived = derive_kek_for_encrypt(mode, &header_nonce, rng)?;

        let mut dek = Zeroizing::new([0u8; KEY]);
        random_bytes(rng, dek.as_mut());

        let padding_length = pipeline::padding_length_for(plaintext_size);
        let chunk_count = pipeline::chunk_count_for(plaintext_size);
        let ciphertext_body_length = chunk_count * CIPHERTEXT_CHUNK_SIZE as u64;

        let stored_name = if opts.encrypt_file_names { original_name.to_string() } else { String::new() };
        let inner = InnerHeader {
            padding_length,
            is_directory,
            file_name: stored_name,
            data_encryption_key: Zeroizing::new(*dek),
        };

        let header_bytes = header::seal_header(&derived.kek, &header_nonce, &derived.ephemeral_public_key, &inner, ciphertext_body_length)?;

        let output_dir = plaintext_path.parent().unwrap_or_else(|| Path::new("."));
        let output_name = if opts.encrypt_file_names {
            let mut id = [0u8; 16];
            random_bytes(rng, &mut id);
            format!("{}.bin.{}", hex_encode(&id), OUTPUT_EXTENSION)
        } else {
            format!("{}.{}", original_name, OUTPUT_EXTENSION)
        };
        let output_path = resolve_collision(output_dir, &output_name);

        let write_result = self
            .write_encrypted(plaintext_path, &output_path, &header_bytes, &dek, &header_nonce, plaintext_size, cancel)
            .await;

        debug!(chunks = chunk_count, "chunk pipeline finished");
        write_result.map(|_| output_path)
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_encrypted(
        &self,
        plaintext_path: &Path,
        output_path: &Path,
        header_bytes: &[u8],
        dek: &Zeroizing<[u8; 32]>,
        header_nonce: &[u8; 24],
        plaintext_size: u64,
        cancel: &dyn CancelSignal,
    ) -> Result<()> {
        let output_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(output_dir).map_err(|e| KryptorError::io(output_dir, e))?;
        tmp.write_all(header_bytes).map_err(|e| KryptorError::io(tmp.path(), e))?;

        let input_std = std::fs::File::open(plaintext_path).map_err(|e| KryptorError::io(plaintext_path, e))?;
        let mut input = tokio::fs::File::from_std(input_std);

        let pipeline_result = encrypt_chunks(&mut input, tmp.as_file_mut(), dek, header_nonce, plaintext_size, cancel).await;

        if let Err(e) = pipeline_result {
            drop(tmp);
            return Err(e);
        }

        crate::security::set_secure_permissions(tmp.path())?;
        tmp.persist(output_path).map_err(|e| KryptorError::io(output_path, e.error))?;
        Ok(())
    }

    pub async fn decrypt_file(&self, input_path: &Path, mode: &DecryptKeyMode, opts: &Options) -> Result<PathBuf> {
        self.decrypt_file_cancellable(input_path, mode, opts, &NoCancel).await
    }

    pub async fn decrypt_file_cancellable(
        &self,
        input_path: &Path,
        mode: &DecryptKeyMode,
        opts: &Options,
        cancel: &dyn CancelSignal,
    ) -> Result<PathBuf> {
        let file_len = std::fs::metadata(input_path).map_err(|e| KryptorError::io(input_path, e))?.len();
        if file_len < FIXED_HEADER_LEN as u64 {
            return Err(KryptorError::UnsupportedFormat);
        }

        let mut std_in = std::fs::File::open(input_path).map_err(|e| KryptorError::io(input_path, e))?;
        let mut prefix_and_inner = vec![0u8; FIXED_HEADER_LEN];
        std_in.read_exact(&mut prefix_and_inner).map_err(|e| KryptorError::io(input_path, e))?;

        let prefix: HeaderPrefix = header::parse_prefix(&prefix_and_inner)?;
        let encrypted_inner = &prefix_and_inner[header::PREFIX_LEN..];
        let ciphertext_body_length = file_len - FIXED_HEADER_LEN as u64;

        let kek = derive_kek_for_decrypt(mode, &prefix.header_nonce, &prefix.ephemeral_public_key)?;
        let inner = header::open_header(&kek, &prefix, encrypted_inner, ciphertext_body_length)?;

        let output_dir = input_path.parent().unwrap_or_else(|| Path::new("."));
        let output_name = if !inner.file_name.is_empty() {
            inner.file_name.clone()
        } else {
            strip_kryptor_extension(input_path)
        };
        let output_path = resolve_collision(output_dir, &output_name);

        // Decrypted bytes always land in an anonymous temp file first. For a
        // plain file that temp file is persisted under `output_path`; for a
        // directory it is instead unpacked into `output_path` and then
        // dropped unpersisted (which deletes it) — this sidesteps naming the
        // intermediate archive off of `output_path` itself, which for a
        // directory name with no dot-extension (the common case) would
        // otherwise collide with `output_path` once `.with_extension("")`
        // is a no-op.
        let tmp = self
            .decrypt_into_tempfile(&mut std_in, output_dir, &prefix.header_nonce, &inner, ciphertext_body_length, cancel)
            .await?;

        let final_path = if inner.is_directory {
            self.packer.unpack(tmp.path(), &output_path)?;
            output_path
        } else {
            crate::security::set_secure_permissions(tmp.path())?;
            tmp.persist(&output_path).map_err(|e| KryptorError::io(&output_path, e.error))?;
            output_path
        };

        if opts.overwrite_input {
            std::fs::remove_file(input_path).map_err(|e| KryptorError::io(input_path, e))?;
        }

        info!(output = %final_path.display(), "decryption complete");
        Ok(final_path)
    }

    async fn decrypt_into_tempfile(
        &self,
        input: &mut std::fs::File,
        output_dir: &Path,
        header_nonce: &[u8; 24],
        inner: &InnerHeader,
        ciphertext_body_length: u64,
        cancel: &dyn CancelSignal,
    ) -> Result<NamedTempFile> {
        input.seek(SeekFrom::Start(FIXED_HEADER_LEN as u64)).map_err(|e| KryptorError::io("<input>", e))?;

        let mut tmp = NamedTempFile::new_in(output_dir).map_err(|e| KryptorError::io(output_dir, e))?;

        let std_in = input.try_clone().map_err(|e| KryptorError::io("<input>", e))?;
        let mut async_in = tokio::fs::File::from_std(std_in);

        let result = decrypt_chunks(
            &mut async_in,
            tmp.as_file_mut(),
            &inner.data_encryption_key,
            header_nonce,
            ciphertext_body_length,
            inner.padding_length,
            cancel,
        )
        .await;

        if let Err(e) = result {
            warn!(error = %e, "decryption failed, discarding partial output");
            drop(tmp);
            return Err(e);
        }

        Ok(tmp)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn strip_kryptor_extension(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    if stem.is_empty() {
        "decrypted".to_string()
    } else {
        stem
    }
}

/// Append `" (n)"` with the smallest `n >= 1` that does not collide with an
/// existing path, computed before the output file is opened (spec.md S4.5).
fn resolve_collision(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = split_ext(name);
    let mut n = 1u32;
    loop {
        let alt_name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let alt = dir.join(&alt_name);
        if !alt.exists() {
            return alt;
        }
        n += 1;
    }
}

fn split_ext(name: &str) -> (String, Option<String>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (name[..idx].to_string(), Some(name[idx + 1..].to_string())),
        _ => (name.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{DecryptKeyMode, EncryptKeyMode};
    use rand::rngs::OsRng;

    #[tokio::test]
    async fn encrypt_then_decrypt_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("plain.txt");
        std::fs::write(&input_path, b"hello world").unwrap();

        let orchestrator = FileOrchestrator::default();
        let mode = EncryptKeyMode::SymmetricKey(Zeroizing::new([9u8; 32]));
        let opts = Options { overwrite_input: false, encrypt_file_names: false };
        let mut rng = OsRng;
        let output_path = orchestrator.encrypt_file(&input_path, &mode, &opts, &mut rng).await.unwrap();
        assert!(output_path.to_string_lossy().ends_with(".kryptor"));

        let dec_mode = DecryptKeyMode::SymmetricKey(Zeroizing::new([9u8; 32]));
        let restored_path = orchestrator.decrypt_file(&output_path, &dec_mode, &opts).await.unwrap();
        assert_eq!(std::fs::read(restored_path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn wrong_key_is_rejected_and_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("plain.txt");
        std::fs::write(&input_path, b"secret").unwrap();

        let orchestrator = FileOrchestrator::default();
        let mode = EncryptKeyMode::SymmetricKey(Zeroizing::new([1u8; 32]));
        let opts = Options::default();
        let mut rng = OsRng;
        let output_path = orchestrator.encrypt_file(&input_path, &mode, &opts, &mut rng).await.unwrap();

        let before: std::collections::HashSet<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();

        let wrong_mode = DecryptKeyMode::SymmetricKey(Zeroizing::new([2u8; 32]));
        let err = orchestrator.decrypt_file(&output_path, &wrong_mode, &opts).await.unwrap_err();
        assert!(matches!(err, KryptorError::TamperOrWrongKey));

        let after: std::collections::HashSet<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn empty_password_is_rejected_on_encrypt() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("plain.txt");
        std::fs::write(&input_path, b"data").unwrap();

        let orchestrator = FileOrchestrator::default();
        let mode = EncryptKeyMode::Password { password: Zeroizing::new(Vec::new()), pre_shared_key: None };
        let opts = Options::default();
        let mut rng = OsRng;
        let err = orchestrator.encrypt_file(&input_path, &mode, &opts, &mut rng).await.unwrap_err();
        assert!(matches!(err, KryptorError::Validation(_)));
    }

    #[test]
    fn collision_naming_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.kryptor"), b"x").unwrap();
        let resolved = resolve_collision(dir.path(), "a.kryptor");
        assert_eq!(resolved.file_name().unwrap().to_string_lossy(), "a (1).kryptor");
    }

    #[tokio::test]
    async fn directory_round_trips_through_archive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), b"x").unwrap();
        std::fs::write(src.join("b.txt"), b"y").unwrap();

        let orchestrator = FileOrchestrator::default();
        let mode = EncryptKeyMode::SymmetricKey(Zeroizing::new([4u8; 32]));
        let opts = Options { overwrite_input: false, encrypt_file_names: true };
        let mut rng = OsRng;
        let output_path = orchestrator.encrypt_file(&src, &mode, &opts, &mut rng).await.unwrap();

        let dec_mode = DecryptKeyMode::SymmetricKey(Zeroizing::new([4u8; 32]));
        let restored_dir = orchestrator.decrypt_file(&output_path, &dec_mode, &opts).await.unwrap();
        assert_eq!(std::fs::read(restored_dir.join("a.txt")).unwrap(), b"x");
        assert_eq!(std::fs::read(restored_dir.join("b.txt")).unwrap(), b"y");

        // The ciphertext persists (overwrite_input was not set) and no
        // leftover intermediate archive remains next to it.
        assert!(output_path.exists());
        let entries: std::collections::HashSet<_> =
            std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(entries, [src, output_path, restored_dir].into_iter().collect());
    }
}

//! Packs a directory into a single archive file before encryption, and
//! unpacks it again after decryption. The core treats the archive as an
//! opaque byte stream (spec.md S6's `ArchivePacker` collaborator); this
//! module is the default implementation of that boundary, kept behind a
//! trait so `FileOrchestrator` never imports `tar` directly.

use crate::error::{KryptorError, Result};
use std::path::{Path, PathBuf};

pub trait ArchivePacker {
    /// Pack `dir_path` into a single archive file, returned as its path.
    /// The archive is written as a sibling of `dir_path`.
    fn pack(&self, dir_path: &Path) -> Result<PathBuf>;

    /// Unpack `archive_path` into `dest_dir`, recreating the original tree.
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;
}

/// `tar`-backed packer. Deterministic enough for round-trip (entries are
/// visited in `read_dir` order); no compression layer, since the chunk
/// pipeline encrypts the archive bytes directly.
pub struct TarArchivePacker;

impl ArchivePacker for TarArchivePacker {
    fn pack(&self, dir_path: &Path) -> Result<PathBuf> {
        let archive_path = sibling_with_suffix(dir_path, ".tar");
        let file = std::fs::File::create(&archive_path).map_err(|e| KryptorError::io(&archive_path, e))?;
        let mut builder = tar::Builder::new(file);
        builder
            .append_dir_all(".", dir_path)
            .map_err(|e| KryptorError::io(dir_path, e))?;
        builder.into_inner().map_err(|e| KryptorError::io(&archive_path, e))?;
        Ok(archive_path)
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dest_dir).map_err(|e| KryptorError::io(dest_dir, e))?;
        let file = std::fs::File::open(archive_path).map_err(|e| KryptorError::io(archive_path, e))?;
        let mut archive = tar::Archive::new(file);
        archive.unpack(dest_dir).map_err(|e| KryptorError::io(dest_dir, e))?;
        Ok(())
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

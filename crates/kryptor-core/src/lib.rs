//! Chunked authenticated-encryption core behind the `kryptor` CLI: password,
//! symmetric-key and X25519 asymmetric file encryption with per-chunk
//! authentication, secret zeroisation, and directory packing.
//!
//! The crate is organised leaf-first:
//!
//! - [`primitives`] wraps the underlying AEAD, KDF, hash and X25519 crates.
//! - [`derivation`] turns a password / symmetric key / keypair into a KEK.
//! - [`header`] encodes and decodes the on-disk file header.
//! - [`pipeline`] streams plaintext to ciphertext (and back) in fixed chunks.
//! - [`archive`] packs/unpacks directories so they can be encrypted as a
//!   single file.
//! - [`orchestrator`] drives one file end to end.
//! - [`batch`] drives a list of files, aggregating results.

pub mod archive;
pub mod batch;
pub mod derivation;
pub mod error;
pub mod header;
pub mod orchestrator;
pub mod pipeline;
pub mod primitives;
pub mod security;

pub use archive::{ArchivePacker, TarArchivePacker};
pub use batch::{BatchDriver, BatchStats, FileResult};
pub use derivation::{DecryptKeyMode, EncryptKeyMode, PreSharedKey};
pub use error::{KryptorError, Result};
pub use orchestrator::{FileOrchestrator, Options};
pub use pipeline::CancelSignal;

//! Iterates a list of input paths through `FileOrchestrator`, aggregating
//! success/failure counts. See spec.md S4.6.

use crate::derivation::{DecryptKeyMode, EncryptKeyMode};
use crate::error::KryptorError;
use crate::orchestrator::{FileOrchestrator, Options};
use rand_core::{CryptoRng, RngCore};
use std::path::PathBuf;
use tracing::{error, info};

/// Outcome of processing one input path.
pub struct FileResult {
    pub input_path: PathBuf,
    pub outcome: Result<PathBuf, KryptorError>,
}

/// Aggregate counters, threaded explicitly through the batch rather than
/// kept in process-wide mutable state (spec.md S9 "global counters" note).
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchStats {
    /// `0` iff every file succeeded, `1` otherwise — matches the exit-code
    /// contract the CLI collaborator reads (spec.md S6).
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }
}

/// Validate paths and options before any file is touched. Returns the
/// subset of paths that may proceed, plus a human-readable reason for each
/// path rejected outright.
pub fn validate_batch(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<(PathBuf, String)>) {
    let mut valid = Vec::with_capacity(paths.len());
    let mut rejected = Vec::new();
    for path in paths {
        if path.exists() {
            valid.push(path.clone());
        } else {
            rejected.push((path.clone(), "path does not exist".to_string()));
        }
    }
    (valid, rejected)
}

pub struct BatchDriver {
    orchestrator: FileOrchestrator,
}

impl Default for BatchDriver {
    fn default() -> Self {
        BatchDriver { orchestrator: FileOrchestrator::default() }
    }
}

impl BatchDriver {
    pub fn new(orchestrator: FileOrchestrator) -> Self {
        BatchDriver { orchestrator }
    }

    /// Encrypt every path in `paths` sequentially under the same key mode.
    /// A failure on one file is recorded and does not abort the batch.
    pub async fn encrypt_all<R: RngCore + CryptoRng>(
        &self,
        paths: &[PathBuf],
        mode: &EncryptKeyMode,
        opts: &Options,
        rng: &mut R,
    ) -> (BatchStats, Vec<FileResult>) {
        let (valid, rejected) = validate_batch(paths);
        let mut stats = BatchStats { total: paths.len(), succeeded: 0, failed: rejected.len() };
        let mut results: Vec<FileResult> = rejected
            .into_iter()
            .map(|(path, reason)| FileResult { input_path: path, outcome: Err(KryptorError::Validation(reason)) })
            .collect();

        for path in &valid {
            let outcome = self.orchestrator.encrypt_file(path, mode, opts, rng).await;
            match &outcome {
                Ok(out) => {
                    stats.succeeded += 1;
                    info!(input = %path.display(), output = %out.display(), "encrypted");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(input = %path.display(), error = %e, "encryption failed");
                }
            }
            results.push(FileResult { input_path: path.clone(), outcome });
        }

        (stats, results)
    }

    /// Decrypt every path in `paths` sequentially under the same key mode.
    pub async fn decrypt_all(
        &self,
        paths: &[PathBuf],
        mode: &DecryptKeyMode,
        opts: &Options,
    ) -> (BatchStats, Vec<FileResult>) {
        let (valid, rejected) = validate_batch(paths);
        let mut stats = BatchStats { total: paths.len(), succeeded: 0, failed: rejected.len() };
        let mut results: Vec<FileResult> = rejected
            .into_iter()
            .map(|(path, reason)| FileResult { input_path: path, outcome: Err(KryptorError::Validation(reason)) })
            .collect();

        for path in &valid {
            let outcome = self.orchestrator.decrypt_file(path, mode, opts).await;
            match &outcome {
                Ok(out) => {
                    stats.succeeded += 1;
                    info!(input = %path.display(), output = %out.display(), "decrypted");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(input = %path.display(), error = %e, "decryption failed");
                }
            }
            results.push(FileResult { input_path: path.clone(), outcome });
        }

        (stats, results)
    }
}

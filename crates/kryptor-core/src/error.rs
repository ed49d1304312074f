use std::path::PathBuf;

/// Error taxonomy for a single file operation.
///
/// Variants are classified at the throw site, never inferred from a generic
/// error downcast at the catch site (see spec's "exception-filtered error
/// classification" design note).
#[derive(thiserror::Error, Debug)]
pub enum KryptorError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Header AEAD or chunk AEAD rejected the tag, or the format version did
    /// not match. Callers MUST surface a single user-visible message and
    /// never reveal which of the two causes applied.
    #[error("incorrect password/key, or this file has been tampered with")]
    TamperOrWrongKey,

    #[error("unsupported file format (version mismatch)")]
    UnsupportedFormat,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl KryptorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KryptorError::Io { path: path.into(), source }
    }

    /// The stable, non-leaking message shown to the end user at the CLI
    /// boundary. `TamperOrWrongKey` is intentionally the only variant whose
    /// `Display` impl already matches this; kept as a helper so callers
    /// don't have to special-case it.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, KryptorError>;

//! Error types for key management and row encryption.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while managing keys or sealing/opening rows.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("failed to write keys file {}: {reason}", path.display())]
    KeyFileWrite { path: PathBuf, reason: String },

    #[error("keys file not found: {}", .0.display())]
    KeyFileNotFound(PathBuf),

    #[error("keys file is corrupt: {0}")]
    KeyFileCorrupt(String),

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

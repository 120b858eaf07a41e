//! Cryptographic core for taskseal.
//!
//! Provides the key material and per-row primitives used to move task
//! definitions and task results across an untrusted channel:
//! - RSA-2048 (OAEP, SHA-256) for wrapping per-row session keys
//! - ChaCha20-Poly1305 for authenticated payload encryption
//! - ECDSA P-256 for detached signatures over each ciphertext blob
//!
//! # Architecture
//!
//! Keys are organised by direction:
//!
//! 1. **Input keys** protect task definitions sent by the operator. The
//!    node holds the RSA private key; the operator holds the ECDSA
//!    signing key.
//!
//! 2. **Output keys** protect results sent back by the node, with the
//!    holders reversed.
//!
//! A row sealed for one direction cannot be opened with the other
//! direction's keys: both the signature check and the key unwrap fail.

mod cipher;
mod error;
pub mod keys;

pub use cipher::{
    decrypt_row, encrypt_row, open_row, seal_row, sign_row, verify_row, SealedRow, BLOB_VERSION,
    NONCE_SIZE, SESSION_KEY_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    generate_and_save_keys, generate_keys, load_keys, save_keys, KeyKind, KeyPurpose, KeyRole,
    KeySlot, RoleKeys, TaskKeys, DEFAULT_KEYS_FILE, RSA_KEY_BITS,
};

// Re-exported so callers can name key types without depending on the
// algorithm crates directly.
pub use p256::ecdsa::{SigningKey, VerifyingKey};
pub use rsa::{RsaPrivateKey, RsaPublicKey};

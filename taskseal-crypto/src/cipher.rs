//! Per-row hybrid encryption with detached signatures.
//!
//! Each row gets a fresh ChaCha20-Poly1305 session key and nonce. The
//! session key is wrapped with the recipient's RSA public key (OAEP,
//! SHA-256) and the whole blob is signed with the sender's P-256 key.
//!
//! Blob layout:
//!
//! ```text
//! version (1) | wrapped_key_len (u16 BE) | wrapped_key | nonce (12) | ciphertext + tag
//! ```
//!
//! Opening always verifies the signature before the blob is parsed.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::RoleKeys;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Current blob format version.
pub const BLOB_VERSION: u8 = 1;

/// Size of the per-row symmetric key in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of the ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const LENGTH_PREFIX_SIZE: usize = 2;

/// A sealed row payload: ciphertext blob plus its detached signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedRow {
    pub ciphertext: Vec<u8>,
    /// DER-encoded ECDSA signature over `ciphertext`.
    pub signature: Vec<u8>,
}

impl SealedRow {
    /// Decodes the base64 text form used in CSV columns.
    ///
    /// A column that is not canonical base64 can never carry a valid
    /// signature, so it is reported as a verification failure.
    pub fn from_base64(ciphertext: &str, signature: &str) -> CryptoResult<Self> {
        let ciphertext = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::SignatureVerification)?;
        let signature = STANDARD
            .decode(signature.trim())
            .map_err(|_| CryptoError::SignatureVerification)?;
        Ok(Self {
            ciphertext,
            signature,
        })
    }

    pub fn ciphertext_base64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }

    pub fn signature_base64(&self) -> String {
        STANDARD.encode(&self.signature)
    }
}

/// Encrypts `plaintext` for the holder of `recipient`'s private key.
pub fn encrypt_row(plaintext: &[u8], recipient: &RsaPublicKey) -> CryptoResult<Vec<u8>> {
    let mut rng = OsRng;

    let mut session_key = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    rng.fill_bytes(session_key.as_mut_slice());
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(session_key.as_slice()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("payload encryption failed: {e}")))?;

    let wrapped_key = recipient
        .encrypt(&mut rng, Oaep::new::<Sha256>(), session_key.as_slice())
        .map_err(|e| CryptoError::Encryption(format!("session key wrap failed: {e}")))?;
    let wrapped_len = u16::try_from(wrapped_key.len())
        .map_err(|_| CryptoError::Encryption("wrapped session key too large".to_string()))?;

    let mut blob = Vec::with_capacity(
        1 + LENGTH_PREFIX_SIZE + wrapped_key.len() + NONCE_SIZE + ciphertext.len(),
    );
    blob.push(BLOB_VERSION);
    blob.extend_from_slice(&wrapped_len.to_be_bytes());
    blob.extend_from_slice(&wrapped_key);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Produces a detached DER signature over the exact blob bytes.
pub fn sign_row(blob: &[u8], signer: &SigningKey) -> Vec<u8> {
    let signature: Signature = signer.sign(blob);
    signature.to_der().as_bytes().to_vec()
}

/// Checks a detached signature without touching the blob contents.
pub fn verify_row(blob: &[u8], signature: &[u8], verifier: &VerifyingKey) -> CryptoResult<()> {
    let signature =
        Signature::from_der(signature).map_err(|_| CryptoError::SignatureVerification)?;
    verifier
        .verify(blob, &signature)
        .map_err(|_| CryptoError::SignatureVerification)
}

/// Verifies, then decrypts a row blob.
///
/// Nothing in the blob is parsed until the signature checks out.
pub fn decrypt_row(
    blob: &[u8],
    signature: &[u8],
    verifier: &VerifyingKey,
    recipient: &RsaPrivateKey,
) -> CryptoResult<Vec<u8>> {
    verify_row(blob, signature, verifier)?;

    let parts = BlobParts::parse(blob)?;

    let session_key = recipient
        .decrypt(Oaep::new::<Sha256>(), parts.wrapped_key)
        .map(Zeroizing::new)
        .map_err(|_| {
            CryptoError::Decryption(
                "session key unwrap failed (wrong key or tampered data)".to_string(),
            )
        })?;
    if session_key.len() != SESSION_KEY_SIZE {
        return Err(CryptoError::Decryption(format!(
            "unwrapped session key is {} bytes, expected {SESSION_KEY_SIZE}",
            session_key.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&session_key));
    cipher
        .decrypt(Nonce::from_slice(parts.nonce), parts.ciphertext)
        .map_err(|_| {
            CryptoError::Decryption(
                "payload authentication failed (wrong key or tampered data)".to_string(),
            )
        })
}

/// Encrypts for, and signs as, the given role.
pub fn seal_row(plaintext: &[u8], keys: &RoleKeys) -> CryptoResult<SealedRow> {
    let ciphertext = encrypt_row(plaintext, keys.encryption_public())?;
    let signature = sign_row(&ciphertext, keys.signing_private());
    Ok(SealedRow {
        ciphertext,
        signature,
    })
}

/// Verifies and decrypts a row sealed for the given role.
pub fn open_row(sealed: &SealedRow, keys: &RoleKeys) -> CryptoResult<Vec<u8>> {
    decrypt_row(
        &sealed.ciphertext,
        &sealed.signature,
        keys.signing_public(),
        keys.encryption_private(),
    )
}

struct BlobParts<'a> {
    wrapped_key: &'a [u8],
    nonce: &'a [u8],
    ciphertext: &'a [u8],
}

impl<'a> BlobParts<'a> {
    fn parse(blob: &'a [u8]) -> CryptoResult<Self> {
        let malformed = || CryptoError::Decryption("malformed ciphertext blob".to_string());

        let (&version, rest) = blob.split_first().ok_or_else(malformed)?;
        if version != BLOB_VERSION {
            return Err(CryptoError::Decryption(format!(
                "unsupported ciphertext blob version {version}"
            )));
        }

        let (len_bytes, rest) = rest.split_at_checked(LENGTH_PREFIX_SIZE).ok_or_else(malformed)?;
        let wrapped_len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        let (wrapped_key, rest) = rest.split_at_checked(wrapped_len).ok_or_else(malformed)?;
        let (nonce, ciphertext) = rest.split_at_checked(NONCE_SIZE).ok_or_else(malformed)?;

        if wrapped_key.is_empty() || ciphertext.len() < TAG_SIZE {
            return Err(malformed());
        }

        Ok(Self {
            wrapped_key,
            nonce,
            ciphertext,
        })
    }
}

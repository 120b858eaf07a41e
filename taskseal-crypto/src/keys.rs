//! Keypair lifecycle: generation, persistence and loading.
//!
//! Two roles exist. Input keys protect task definitions flowing from the
//! operator to the execution node; Output keys protect results flowing
//! back. Each role owns an RSA keypair for wrapping session keys and a
//! P-256 ECDSA keypair for detached row signatures, so a keys file always
//! holds eight PEM documents.
//!
//! A keys file is either complete and internally consistent or it is
//! rejected. There is no partially loaded state.

use crate::error::{CryptoError, CryptoResult};
use p256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

/// Well-known keys file name used when no path is configured.
pub const DEFAULT_KEYS_FILE: &str = "tasks_keys.json";

/// RSA modulus size for the encryption keypairs.
pub const RSA_KEY_BITS: usize = 2048;

/// Direction a keypair protects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Task definitions, operator -> node.
    Input,
    /// Task results, node -> operator.
    Output,
}

impl KeyRole {
    pub const ALL: [KeyRole; 2] = [KeyRole::Input, KeyRole::Output];

    fn identifier_part(self) -> &'static str {
        match self {
            KeyRole::Input => "INPUTS",
            KeyRole::Output => "OUTPUTS",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Input => f.write_str("input"),
            KeyRole::Output => f.write_str("output"),
        }
    }
}

/// What a keypair is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    Encryption,
    Signing,
}

/// Which half of a keypair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Public,
    Private,
}

/// One of the eight key values persisted in a keys file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeySlot {
    pub role: KeyRole,
    pub purpose: KeyPurpose,
    pub kind: KeyKind,
}

impl KeySlot {
    /// Every slot, in the order they are written.
    pub fn all() -> impl Iterator<Item = KeySlot> {
        KeyRole::ALL.into_iter().flat_map(|role| {
            [KeyPurpose::Encryption, KeyPurpose::Signing]
                .into_iter()
                .flat_map(move |purpose| {
                    [KeyKind::Public, KeyKind::Private]
                        .into_iter()
                        .map(move |kind| KeySlot { role, purpose, kind })
                })
        })
    }

    /// Stable identifier of this slot inside a keys file,
    /// e.g. `TASKS_INPUTS_RSA_PUBLIC_KEY`.
    pub fn identifier(&self) -> String {
        let algorithm = match self.purpose {
            KeyPurpose::Encryption => "RSA",
            KeyPurpose::Signing => "ECDSA",
        };
        let kind = match self.kind {
            KeyKind::Public => "PUBLIC",
            KeyKind::Private => "PRIVATE",
        };
        format!("TASKS_{}_{algorithm}_{kind}_KEY", self.role.identifier_part())
    }
}

/// Both keypairs belonging to one role.
///
/// The encryption keypair belongs to the recipient of rows in this
/// direction, the signing keypair to the sender.
#[derive(Clone)]
pub struct RoleKeys {
    encryption_private: RsaPrivateKey,
    encryption_public: RsaPublicKey,
    signing_private: SigningKey,
    signing_public: VerifyingKey,
}

impl RoleKeys {
    /// Generates a fresh RSA + ECDSA keypair set.
    pub fn generate() -> CryptoResult<Self> {
        let mut rng = OsRng;
        let encryption_private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(format!("RSA keypair: {e}")))?;
        let encryption_public = encryption_private.to_public_key();
        let signing_private = SigningKey::random(&mut rng);
        let signing_public = VerifyingKey::from(&signing_private);

        Ok(Self {
            encryption_private,
            encryption_public,
            signing_private,
            signing_public,
        })
    }

    pub fn encryption_private(&self) -> &RsaPrivateKey {
        &self.encryption_private
    }

    pub fn encryption_public(&self) -> &RsaPublicKey {
        &self.encryption_public
    }

    pub fn signing_private(&self) -> &SigningKey {
        &self.signing_private
    }

    pub fn signing_public(&self) -> &VerifyingKey {
        &self.signing_public
    }

    fn encode_into(
        &self,
        role: KeyRole,
        pems: &mut BTreeMap<String, String>,
    ) -> CryptoResult<()> {
        let encode_err = |slot: KeySlot, e: &dyn fmt::Display| {
            CryptoError::KeyGeneration(format!("cannot encode {}: {e}", slot.identifier()))
        };

        for slot in KeySlot::all().filter(|s| s.role == role) {
            let pem = match (slot.purpose, slot.kind) {
                (KeyPurpose::Encryption, KeyKind::Public) => self
                    .encryption_public
                    .to_public_key_pem(LineEnding::LF)
                    .map_err(|e| encode_err(slot, &e))?,
                (KeyPurpose::Encryption, KeyKind::Private) => self
                    .encryption_private
                    .to_pkcs8_pem(LineEnding::LF)
                    .map(|pem| pem.as_str().to_owned())
                    .map_err(|e| encode_err(slot, &e))?,
                (KeyPurpose::Signing, KeyKind::Public) => self
                    .signing_public
                    .to_public_key_pem(LineEnding::LF)
                    .map_err(|e| encode_err(slot, &e))?,
                (KeyPurpose::Signing, KeyKind::Private) => self
                    .signing_private
                    .to_pkcs8_pem(LineEnding::LF)
                    .map(|pem| pem.as_str().to_owned())
                    .map_err(|e| encode_err(slot, &e))?,
            };
            pems.insert(slot.identifier(), pem);
        }
        Ok(())
    }

    fn decode_from(role: KeyRole, pems: &BTreeMap<String, String>) -> CryptoResult<Self> {
        let slot = |purpose, kind| KeySlot { role, purpose, kind };

        let encryption_public = {
            let slot = slot(KeyPurpose::Encryption, KeyKind::Public);
            RsaPublicKey::from_public_key_pem(slot_pem(pems, slot)?)
                .map_err(|e| invalid_slot(slot, &e))?
        };
        let encryption_private = {
            let slot = slot(KeyPurpose::Encryption, KeyKind::Private);
            let key = RsaPrivateKey::from_pkcs8_pem(slot_pem(pems, slot)?)
                .map_err(|e| invalid_slot(slot, &e))?;
            key.validate().map_err(|e| invalid_slot(slot, &e))?;
            key
        };
        let signing_public = {
            let slot = slot(KeyPurpose::Signing, KeyKind::Public);
            VerifyingKey::from_public_key_pem(slot_pem(pems, slot)?)
                .map_err(|e| invalid_slot(slot, &e))?
        };
        let signing_private = {
            let slot = slot(KeyPurpose::Signing, KeyKind::Private);
            SigningKey::from_pkcs8_pem(slot_pem(pems, slot)?)
                .map_err(|e| invalid_slot(slot, &e))?
        };

        if encryption_public.size() * 8 < RSA_KEY_BITS {
            return Err(CryptoError::KeyFileCorrupt(format!(
                "{role} RSA modulus is {} bits, at least {RSA_KEY_BITS} required",
                encryption_public.size() * 8
            )));
        }
        if encryption_private.to_public_key() != encryption_public {
            return Err(CryptoError::KeyFileCorrupt(format!(
                "{role} RSA private key does not match its public key"
            )));
        }
        if VerifyingKey::from(&signing_private) != signing_public {
            return Err(CryptoError::KeyFileCorrupt(format!(
                "{role} ECDSA private key does not match its public key"
            )));
        }

        Ok(Self {
            encryption_private,
            encryption_public,
            signing_private,
            signing_public,
        })
    }
}

impl fmt::Debug for RoleKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleKeys")
            .field("rsa_bits", &(self.encryption_public.size() * 8))
            .finish_non_exhaustive()
    }
}

fn slot_pem(pems: &BTreeMap<String, String>, slot: KeySlot) -> CryptoResult<&str> {
    let id = slot.identifier();
    match pems.get(&id) {
        Some(pem) if !pem.trim().is_empty() => Ok(pem.as_str()),
        _ => Err(CryptoError::KeyFileCorrupt(format!("missing {id}"))),
    }
}

fn invalid_slot(slot: KeySlot, e: &dyn fmt::Display) -> CryptoError {
    CryptoError::KeyFileCorrupt(format!("invalid {}: {e}", slot.identifier()))
}

/// The complete key set: Input and Output roles.
#[derive(Clone, Debug)]
pub struct TaskKeys {
    inputs: RoleKeys,
    outputs: RoleKeys,
}

impl TaskKeys {
    pub fn new(inputs: RoleKeys, outputs: RoleKeys) -> Self {
        Self { inputs, outputs }
    }

    /// Returns the keys for one direction.
    pub fn role(&self, role: KeyRole) -> &RoleKeys {
        match role {
            KeyRole::Input => &self.inputs,
            KeyRole::Output => &self.outputs,
        }
    }

    pub fn inputs(&self) -> &RoleKeys {
        &self.inputs
    }

    pub fn outputs(&self) -> &RoleKeys {
        &self.outputs
    }
}

/// Generates a complete in-memory key set.
pub fn generate_keys() -> CryptoResult<TaskKeys> {
    Ok(TaskKeys {
        inputs: RoleKeys::generate()?,
        outputs: RoleKeys::generate()?,
    })
}

/// Serializes all eight key values to `path`.
///
/// The file is written next to its destination through a temporary file
/// (created with owner-only permissions), synced, and renamed into place.
pub fn save_keys(keys: &TaskKeys, path: impl AsRef<Path>) -> CryptoResult<()> {
    let path = path.as_ref();
    let write_err = |reason: String| CryptoError::KeyFileWrite {
        path: path.to_path_buf(),
        reason,
    };

    let mut pems = BTreeMap::new();
    for role in KeyRole::ALL {
        keys.role(role).encode_into(role, &mut pems)?;
    }
    let json = serde_json::to_string_pretty(&pems).map(Zeroizing::new);
    pems.values_mut().for_each(Zeroize::zeroize);
    let json = json.map_err(|e| write_err(e.to_string()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| write_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;

    debug!(path = %path.display(), "keys file written");
    Ok(())
}

/// Loads and validates a keys file.
///
/// Every one of the eight values must be present and decodable, and each
/// private key must match the stored public key.
pub fn load_keys(path: impl AsRef<Path>) -> CryptoResult<TaskKeys> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => Zeroizing::new(raw),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CryptoError::KeyFileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(CryptoError::KeyFileCorrupt(format!("unreadable: {e}"))),
    };

    let mut pems: BTreeMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| CryptoError::KeyFileCorrupt(format!("invalid JSON: {e}")))?;

    let keys = RoleKeys::decode_from(KeyRole::Input, &pems).and_then(|inputs| {
        let outputs = RoleKeys::decode_from(KeyRole::Output, &pems)?;
        Ok(TaskKeys { inputs, outputs })
    });
    pems.values_mut().for_each(Zeroize::zeroize);

    if keys.is_ok() {
        debug!(path = %path.display(), "keys file loaded");
    }
    keys
}

/// Generates four fresh keypairs and persists them to `path`.
pub fn generate_and_save_keys(path: impl AsRef<Path>) -> CryptoResult<TaskKeys> {
    let path = path.as_ref();
    let keys = generate_keys()?;
    save_keys(&keys, path)?;
    info!(path = %path.display(), "generated input and output keypairs");
    Ok(keys)
}

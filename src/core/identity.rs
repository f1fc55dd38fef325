// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Identity & signing (C1): Ed25519 keypair generation/load and raw byte
//! signing. The on-disk format is a small JSON document with hex-encoded
//! keys, per the external interfaces section of the protocol
//! specification — distinct from a PKCS#8 blob.

use ring::rand::SecureRandom;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

/// Identity / signing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// No keypair file is present at the given path.
    #[error("absent")]
    Absent,
    /// The keypair file exists but could not be parsed.
    #[error("corrupt")]
    Corrupt,
    /// I/O failure while reading or writing the keypair file.
    #[error("io")]
    Io,
    /// Key material failed to decode into a valid Ed25519 keypair.
    #[error("invalid key")]
    InvalidKey,
}

/// An Ed25519 keypair: 32-byte public key, 32-byte seed (private key).
#[derive(Clone)]
pub struct Keypair {
    /// Public key bytes.
    pub public: [u8; 32],
    seed: [u8; 32],
}

impl Keypair {
    /// Hex-encoded public key, the agent identifier used throughout the
    /// protocol (`record.agent`).
    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    fn ring_keypair(&self) -> Result<Ed25519KeyPair, IdentityError> {
        Ed25519KeyPair::from_seed_and_public_key(&self.seed, &self.public)
            .map_err(|_| IdentityError::InvalidKey)
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

/// On-disk keypair document: `{publicKey_hex, privateKey_hex, createdAt}`.
#[derive(Serialize, Deserialize)]
struct KeyDocument {
    #[serde(rename = "publicKey_hex")]
    public_key_hex: String,
    #[serde(rename = "privateKey_hex")]
    private_key_hex: String,
    #[serde(rename = "createdAt")]
    created_at: u64,
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generate a fresh random keypair. Never touches disk.
pub fn generate() -> Result<Keypair, IdentityError> {
    let rng = ring::rand::SystemRandom::new();
    let mut seed = [0u8; 32];
    rng.fill(&mut seed).map_err(|_| IdentityError::InvalidKey)?;
    let kp = Ed25519KeyPair::from_seed_unchecked(&seed).map_err(|_| IdentityError::InvalidKey)?;
    let mut public = [0u8; 32];
    public.copy_from_slice(kp.public_key().as_ref());
    Ok(Keypair { public, seed })
}

/// Load a keypair from `path`. Returns `Absent` if the file does not
/// exist, `Corrupt` if it cannot be parsed, `InvalidKey` if the key
/// material is malformed.
pub fn load(path: &Path) -> Result<Keypair, IdentityError> {
    if !path.exists() {
        return Err(IdentityError::Absent);
    }
    let raw = fs::read_to_string(path).map_err(|_| IdentityError::Io)?;
    let doc: KeyDocument = serde_json::from_str(&raw).map_err(|_| IdentityError::Corrupt)?;

    let pub_bytes = hex::decode(&doc.public_key_hex).map_err(|_| IdentityError::Corrupt)?;
    let mut priv_bytes = hex::decode(&doc.private_key_hex).map_err(|_| IdentityError::Corrupt)?;
    if pub_bytes.len() != 32 || priv_bytes.len() != 32 {
        priv_bytes.zeroize();
        return Err(IdentityError::Corrupt);
    }

    let mut public = [0u8; 32];
    public.copy_from_slice(&pub_bytes);
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&priv_bytes);
    priv_bytes.zeroize();

    // Confirm the seed actually derives the claimed public key.
    let derived = Ed25519KeyPair::from_seed_unchecked(&seed).map_err(|_| IdentityError::InvalidKey)?;
    if derived.public_key().as_ref() != public {
        return Err(IdentityError::InvalidKey);
    }

    Ok(Keypair { public, seed })
}

/// Persist `kp` to `path` with mode 0600, creating parent directories as
/// needed.
pub fn save(path: &Path, kp: &Keypair) -> Result<(), IdentityError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| IdentityError::Io)?;
    }
    let doc = KeyDocument {
        public_key_hex: hex::encode(kp.public),
        private_key_hex: hex::encode(kp.seed),
        created_at: now_unix(),
    };
    let json = serde_json::to_string_pretty(&doc).map_err(|_| IdentityError::Io)?;

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| IdentityError::Io)?;
        f.write_all(json.as_bytes()).map_err(|_| IdentityError::Io)?;
        let _ = f.sync_all();
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600));
    }
    fs::rename(&tmp, path).map_err(|_| IdentityError::Io)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

/// Load the keypair at `path`, creating and persisting a new one if
/// absent. Fatal (propagates) only on `Corrupt`/`InvalidKey`/`Io`.
pub fn load_or_create(path: &Path) -> Result<Keypair, IdentityError> {
    match load(path) {
        Ok(kp) => Ok(kp),
        Err(IdentityError::Absent) => {
            let kp = generate()?;
            save(path, &kp)?;
            Ok(kp)
        }
        Err(e) => Err(e),
    }
}

/// Sign `message` with `kp`, returning the 64-byte Ed25519 signature.
pub fn sign(message: &[u8], kp: &Keypair) -> Result<[u8; 64], IdentityError> {
    let ring_kp = kp.ring_keypair()?;
    let sig = ring_kp.sign(message);
    let mut out = [0u8; 64];
    out.copy_from_slice(sig.as_ref());
    Ok(out)
}

/// Verify `signature` over `message` against `public_key`. Never panics;
/// malformed input (wrong lengths, invalid key bytes) returns `false`.
pub fn verify(signature: &[u8], message: &[u8], public_key: &[u8]) -> bool {
    if signature.len() != 64 || public_key.len() != 32 {
        return false;
    }
    let pk = UnparsedPublicKey::new(&ED25519, public_key);
    pk.verify(message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_sign_verify_roundtrip() {
        let kp = generate().unwrap();
        let msg = b"activity-record-id-string";
        let sig = sign(msg, &kp).unwrap();
        assert!(verify(&sig, msg, &kp.public));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = generate().unwrap();
        let sig = sign(b"hello", &kp).unwrap();
        assert!(!verify(&sig, b"goodbye", &kp.public));
    }

    #[test]
    fn verify_never_panics_on_malformed_input() {
        assert!(!verify(&[], b"x", &[]));
        assert!(!verify(&[0u8; 3], b"x", &[0u8; 3]));
        assert!(!verify(&[0u8; 64], b"x", &[0u8; 32]));
    }

    #[test]
    fn load_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        assert_eq!(load(&path).unwrap_err(), IdentityError::Absent);
    }

    #[test]
    fn load_corrupt_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, b"not json").unwrap();
        assert_eq!(load(&path).unwrap_err(), IdentityError::Corrupt);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let kp = load_or_create(&path).unwrap();
        let kp2 = load(&path).unwrap();
        assert_eq!(kp.public, kp2.public);
    }
}

//! Device keypair management and possession proofs.
//!
//! Each client installation holds one long-lived Ed25519 keypair. The
//! private half never leaves the device; the server only ever stores the
//! public key's hash, which is what a certificate is bound to. On real
//! clients the private key lives in hardware-backed storage and signing is
//! invoked through the platform keystore API; this module's key-file
//! persistence is the portable equivalent with owner-only permissions.

use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::OacError;

/// Challenge size for possession proofs.
pub const CHALLENGE_LEN: usize = 32;

/// An Ed25519 keypair held exclusively by one device.
pub struct DeviceKeyPair {
    signing: SigningKey,
}

impl std::fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl DeviceKeyPair {
    /// Generate a new random device keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, OacError> {
        if bytes.len() != 32 {
            return Err(OacError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let signing = SigningKey::from_bytes(&arr);
        arr.zeroize();
        Ok(Self { signing })
    }

    /// Get the public key as raw bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Get the public verification key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Colon-hex SHA-256 fingerprint of the public key, the only device
    /// key material the server ever stores.
    pub fn public_key_hash(&self) -> String {
        fingerprint_of(&self.public_bytes())
    }

    /// Sign an arbitrary message with the device private key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Save the secret key to a file with restrictive permissions.
    pub fn save_to_file(&self, path: &Path) -> Result<(), OacError> {
        save_secret_key(&self.signing, path)
    }

    /// Load a keypair from a file containing the 32-byte secret key.
    ///
    /// On Unix, verifies file permissions are 0600 (owner-only) before
    /// reading, and reads into a fixed-size array so no heap allocation
    /// holds key material.
    pub fn load_from_file(path: &Path) -> Result<Self, OacError> {
        let signing = load_secret_key(path)?;
        Ok(Self { signing })
    }

    /// Load from file, or generate a new keypair and save it.
    pub fn load_or_generate(path: &Path) -> Result<Self, OacError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let kp = Self::generate();
            kp.save_to_file(path)?;
            Ok(kp)
        }
    }
}

/// Prove current possession of the device private key and that the key in
/// hand is the one a certificate was bound to.
///
/// Runs entirely locally: a fresh random challenge is signed with the
/// device private key and checked against the device public key, and the
/// public key's fingerprint is compared (constant-time) against the hash
/// embedded in the certificate. Both checks are required: a stolen
/// certificate plus an attacker-generated keypair passes the first but
/// not the second.
pub fn prove_possession(device: &DeviceKeyPair, expected_hash: &str) -> Result<(), OacError> {
    let mut challenge = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);

    let signature = device.sign(&challenge);
    if device
        .verifying_key()
        .verify(&challenge, &signature)
        .is_err()
    {
        return Err(OacError::DeviceMismatch);
    }

    if !constant_time_str_eq(&device.public_key_hash(), expected_hash) {
        return Err(OacError::DeviceMismatch);
    }

    Ok(())
}

/// Compute a colon-separated hex SHA-256 fingerprint of key bytes.
pub fn fingerprint_of(key_bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(key_bytes);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Constant-time string equality to keep hash comparison free of timing
/// side channels.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub(crate) fn save_secret_key(signing: &SigningKey, path: &Path) -> Result<(), OacError> {
    let dir = path.parent().ok_or_else(|| {
        OacError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;
    std::fs::create_dir_all(dir)?;

    let mut bytes = signing.to_bytes();
    std::fs::write(path, bytes)?;
    bytes.zeroize();

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

pub(crate) fn load_secret_key(path: &Path) -> Result<SigningKey, OacError> {
    use std::io::Read;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(OacError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("Key file has insecure permissions: {mode:o} (expected 600)"),
            )));
        }
    }

    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 32];
    file.read_exact(&mut buf)?;
    let signing = SigningKey::from_bytes(&buf);
    buf.zeroize();
    Ok(signing)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generate_device_keypair_produces_32_byte_public() {
        let kp = DeviceKeyPair::generate();
        assert_eq!(kp.public_bytes().len(), 32);
    }

    #[test]
    fn from_secret_bytes_roundtrip() {
        let kp = DeviceKeyPair::generate();
        let secret = kp.signing.to_bytes();
        let kp2 = DeviceKeyPair::from_secret_bytes(&secret).unwrap();
        assert_eq!(kp.public_bytes(), kp2.public_bytes());
    }

    #[test]
    fn from_secret_bytes_rejects_wrong_length() {
        let err = DeviceKeyPair::from_secret_bytes(&[0u8; 16]).unwrap_err();
        match err {
            OacError::InvalidKeyLength {
                expected: 32,
                actual: 16,
            } => {}
            _ => panic!("wrong error: {err:?}"),
        }
    }

    #[test]
    fn two_keypairs_are_distinct() {
        let kp1 = DeviceKeyPair::generate();
        let kp2 = DeviceKeyPair::generate();
        assert_ne!(kp1.public_bytes(), kp2.public_bytes());
        assert_ne!(kp1.public_key_hash(), kp2.public_key_hash());
    }

    #[test]
    fn fingerprint_is_colon_separated_hex() {
        let kp = DeviceKeyPair::generate();
        let fp = kp.public_key_hash();

        // SHA-256 = 32 bytes = 32 hex pairs + 31 colons = 95 chars
        assert_eq!(fp.len(), 95);
        for segment in fp.split(':') {
            assert_eq!(segment.len(), 2);
            assert!(segment.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn possession_proof_passes_for_matching_hash() {
        let kp = DeviceKeyPair::generate();
        assert!(prove_possession(&kp, &kp.public_key_hash()).is_ok());
    }

    #[test]
    fn possession_proof_fails_for_foreign_hash() {
        let kp = DeviceKeyPair::generate();
        let other = DeviceKeyPair::generate();
        let err = prove_possession(&kp, &other.public_key_hash()).unwrap_err();
        assert!(matches!(err, OacError::DeviceMismatch));
    }

    #[test]
    fn save_and_load_device_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("device.key");

        let kp = DeviceKeyPair::generate();
        kp.save_to_file(&path).unwrap();

        let loaded = DeviceKeyPair::load_from_file(&path).unwrap();
        assert_eq!(loaded.public_bytes(), kp.public_bytes());
    }

    #[test]
    fn load_or_generate_is_stable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("device.key");

        let kp = DeviceKeyPair::load_or_generate(&path).unwrap();
        assert!(path.exists());
        let kp2 = DeviceKeyPair::load_or_generate(&path).unwrap();
        assert_eq!(kp.public_bytes(), kp2.public_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_permissions_are_restrictive() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("device.key");
        DeviceKeyPair::generate().save_to_file(&path).unwrap();

        let perms = std::fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn load_rejects_world_readable_key_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("device.key");
        DeviceKeyPair::generate().save_to_file(&path).unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(DeviceKeyPair::load_from_file(&path).is_err());
    }

    #[test]
    fn load_truncated_key_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("device.key");
        std::fs::write(&path, [0u8; 20]).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }

        assert!(DeviceKeyPair::load_from_file(&path).is_err());
    }

    #[test]
    fn debug_impl_redacts_secret() {
        let kp = DeviceKeyPair::generate();
        let debug_output = format!("{kp:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(&hex::encode(kp.signing.to_bytes())));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_str_eq("abc", "abc"));
        assert!(!constant_time_str_eq("abc", "abd"));
        assert!(!constant_time_str_eq("abc", "abcd"));
    }
}

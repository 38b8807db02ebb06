//! Certificate issuance.
//!
//! The signer holds the deployment's single Ed25519 signing keypair. The
//! private half is loaded once at process start from secure configuration;
//! its absence is `SigningUnavailable`, a fatal startup condition rather
//! than a per-request error. The public half is embedded in clients at
//! build time and also served unauthenticated at runtime.

use std::path::Path;

use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::certificate::{Certificate, CertificateClaims, unix_now};
use crate::device::{fingerprint_of, load_secret_key, save_secret_key};
use crate::error::OacError;
use crate::verifier::ServerPublicKey;

/// Default certificate lifetime: 7 days.
pub const DEFAULT_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

/// Hard ceiling on the certificate lifetime: 14 days. Configuration above
/// this is clamped, never honored.
pub const LIFETIME_CEILING_SECS: i64 = 14 * 24 * 60 * 60;

/// The server's Ed25519 signing keypair.
pub struct ServerKeyPair {
    signing: SigningKey,
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl ServerKeyPair {
    /// Generate a new random signing keypair.
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

    /// The public half, as distributed to clients.
    pub fn public_key(&self) -> ServerPublicKey {
        ServerPublicKey::from_verifying_key(self.signing.verifying_key())
    }

    /// Save the secret key to a file with restrictive permissions.
    pub fn save_to_file(&self, path: &Path) -> Result<(), OacError> {
        save_secret_key(&self.signing, path)
    }

    /// Load from a 32-byte key file (0600 permissions enforced on Unix).
    pub fn load_from_file(path: &Path) -> Result<Self, OacError> {
        let signing = load_secret_key(path)?;
        Ok(Self { signing })
    }

    pub(crate) fn sign(&self, message: &[u8]) -> ed25519_dalek::Signature {
        self.signing.sign(message)
    }
}

/// Issues and renews certificates with the server private key.
#[derive(Debug)]
pub struct CertificateSigner {
    keys: ServerKeyPair,
    lifetime_secs: i64,
}

impl CertificateSigner {
    /// Build a signer with the given lifetime, clamped to the hard ceiling.
    pub fn new(keys: ServerKeyPair, lifetime_secs: i64) -> Self {
        Self {
            keys,
            lifetime_secs: lifetime_secs.clamp(1, LIFETIME_CEILING_SECS),
        }
    }

    /// Load the signing key from configuration at startup.
    ///
    /// Any failure here (missing file, bad permissions, wrong length) is
    /// `SigningUnavailable` and should abort startup of the issuing side.
    pub fn from_key_file(path: &Path, lifetime_secs: i64) -> Result<Self, OacError> {
        let keys = ServerKeyPair::load_from_file(path).map_err(|e| {
            OacError::SigningUnavailable(format!("{}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "OAC signing key loaded");
        Ok(Self::new(keys, lifetime_secs))
    }

    /// The configured lifetime actually applied to issued certificates.
    pub const fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Issue a certificate for a registered device, stamped at the current
    /// time.
    pub fn issue(
        &self,
        user_id: &str,
        device_id: &str,
        device_public_key_hash: &str,
        app_version: &str,
    ) -> Result<Certificate, OacError> {
        self.issue_at(user_id, device_id, device_public_key_hash, app_version, unix_now())
    }

    /// Issue a certificate with an explicit issued-at instant. Renewal uses
    /// the same path; a renewed certificate is identical in shape, with a
    /// fresh `iat`/`exp` pair.
    pub fn issue_at(
        &self,
        user_id: &str,
        device_id: &str,
        device_public_key_hash: &str,
        app_version: &str,
        now: i64,
    ) -> Result<Certificate, OacError> {
        let claims = CertificateClaims::new(
            user_id,
            device_id,
            device_public_key_hash,
            now,
            now + self.lifetime_secs,
            app_version,
        );
        let claims_bytes = serde_json::to_vec(&claims)
            .map_err(|e| OacError::Encoding(format!("claims JSON: {e}")))?;
        let signature = self.keys.sign(&claims_bytes);

        tracing::debug!(device_id, exp = claims.exp, "Certificate issued");

        Ok(Certificate::from_signed_parts(&claims_bytes, &signature))
    }

    /// The public verification key clients embed.
    pub fn public_key(&self) -> ServerPublicKey {
        self.keys.public_key()
    }

    /// Colon-hex fingerprint of the public key, for operator display.
    pub fn public_key_fingerprint(&self) -> String {
        fingerprint_of(&self.keys.public_bytes())
    }
}

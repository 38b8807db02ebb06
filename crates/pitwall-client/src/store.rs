//! Persistent certificate bundle store.
//!
//! The client keeps exactly one bundle on disk: the current certificate,
//! the pinned server public key, and the device id. Replacement is
//! transactional (write to a temp file in the same directory, then rename),
//! so a renewal that fails or is cancelled mid-flight leaves the previous
//! bundle untouched.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pitwall_oac::{Certificate, unix_now};

use crate::error::ClientError;

/// Everything the client persists between launches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateBundle {
    /// The registered device id this bundle belongs to.
    pub device_id: String,
    /// The current certificate in wire form.
    pub certificate: Certificate,
    /// Base64url of the pinned server public key.
    pub server_public_key: String,
    /// Set once the server answers a renewal with revoked/not-found; the
    /// certificate stays usable offline until its own expiry, but no
    /// further renewal is attempted.
    #[serde(default)]
    pub renewal_denied: bool,
    /// When this bundle was written (Unix timestamp).
    pub stored_at: i64,
}

impl CertificateBundle {
    /// Build a bundle from a successful registration response.
    pub fn new(
        device_id: impl Into<String>,
        certificate: Certificate,
        server_public_key: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            certificate,
            server_public_key: server_public_key.into(),
            renewal_denied: false,
            stored_at: unix_now(),
        }
    }
}

/// On-disk JSON store for the certificate bundle.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    path: PathBuf,
}

impl CertificateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored bundle. Returns `None` if nothing is stored yet.
    pub fn load(&self) -> Result<Option<CertificateBundle>, ClientError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let bundle = serde_json::from_str(&data).map_err(|e| {
            ClientError::Store(format!("Failed to parse certificate bundle: {e}"))
        })?;
        Ok(Some(bundle))
    }

    /// Atomically replace the stored bundle.
    ///
    /// The new content is fully written and fsynced to a temp file in the
    /// same directory before the rename, so the store never holds a
    /// half-written bundle.
    pub fn replace(&self, bundle: &CertificateBundle) -> Result<(), ClientError> {
        let dir = self.path.parent().ok_or_else(|| {
            ClientError::Store("store path has no parent directory".to_string())
        })?;
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(bundle).map_err(|e| {
            ClientError::Store(format!("Failed to serialize certificate bundle: {e}"))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| ClientError::Store(format!("Failed to persist bundle: {e}")))?;

        Ok(())
    }

    /// Mark the stored bundle non-renewable after the server denied
    /// renewal. The certificate itself is kept; it remains valid offline
    /// until its own expiry.
    pub fn mark_renewal_denied(&self) -> Result<(), ClientError> {
        let mut bundle = self.load()?.ok_or(ClientError::NoCertificate)?;
        bundle.renewal_denied = true;
        self.replace(&bundle)
    }
}

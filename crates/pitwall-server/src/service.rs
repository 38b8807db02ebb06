//! Device service: the server boundary for registration, renewal, listing,
//! revocation, and public-key distribution.
//!
//! All operations except `server_public_key` expect an already
//! authenticated caller identity supplied by the online session system;
//! authentication itself is not this layer's concern. Errors stay
//! distinguishable so a transport layer can map them onto status semantics
//! (`DeviceRevoked` is permission-denied, not not-found).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use pitwall_oac::{Certificate, CertificateSigner, OacError, fingerprint_of};

use crate::storage::{Database, DatabaseError, Device, DeviceClass};

/// Errors from device-service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Renewal/revocation target absent for this user; the client should
    /// re-register.
    #[error("Device not found")]
    DeviceNotFound,

    /// Renewal denied: the device is revoked. The client should stop
    /// attempting renewal and inform the user. This is the server's only
    /// revocation lever and is checked on every renewal.
    #[error("Device has been revoked")]
    DeviceRevoked,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Certificate(#[from] OacError),
}

/// Registration request from a client that just generated its keypair.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDevice {
    /// Base64url of the device's 32-byte Ed25519 public key. Only its hash
    /// is persisted.
    pub device_public_key: String,
    pub device_name: String,
    pub device_type: DeviceClass,
    #[serde(default)]
    pub app_version: String,
}

/// Successful registration: the device id, its first certificate, and the
/// server public key for the client to pin.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredDevice {
    pub device_id: String,
    pub certificate: Certificate,
    pub server_public_key: String,
}

/// Successful renewal.
#[derive(Debug, Clone, Serialize)]
pub struct RenewedCertificate {
    pub device_id: String,
    pub certificate: Certificate,
}

/// Read-only device listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub app_version: String,
    pub is_revoked: bool,
    pub registered_at: i64,
    pub last_renewed: Option<i64>,
}

impl From<Device> for DeviceSummary {
    fn from(d: Device) -> Self {
        let is_revoked = d.revoked();
        Self {
            device_id: d.device_id,
            device_name: d.device_name,
            device_type: d.device_type,
            app_version: d.app_version,
            is_revoked,
            registered_at: d.registered_at,
            last_renewed: d.last_renewed,
        }
    }
}

/// The server's public key material. Requires no authentication; it is
/// public by design.
#[derive(Debug, Clone, Serialize)]
pub struct PublicKeyInfo {
    pub public_key: String,
    pub fingerprint: String,
}

/// Device registry plus certificate signer behind the boundary operations.
pub struct DeviceService {
    db: Database,
    signer: CertificateSigner,
}

impl std::fmt::Debug for DeviceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceService")
            .field("signer_fingerprint", &self.signer.public_key_fingerprint())
            .finish_non_exhaustive()
    }
}

impl DeviceService {
    pub const fn new(db: Database, signer: CertificateSigner) -> Self {
        Self { db, signer }
    }

    /// Register a new device for offline use and issue its first
    /// certificate.
    ///
    /// Validation of the public key is structural only (base64, 32 bytes):
    /// a key that is structurally valid but cryptographically wrong simply
    /// fails later verification on the device, which is indistinguishable
    /// over the network from revocation.
    pub async fn register(
        &self,
        user_id: &str,
        req: RegisterDevice,
    ) -> Result<RegisteredDevice, ServiceError> {
        if req.device_name.trim().is_empty() {
            return Err(ServiceError::InvalidArgument(
                "device_name is required".to_string(),
            ));
        }
        let key_bytes = URL_SAFE_NO_PAD
            .decode(req.device_public_key.trim())
            .map_err(|e| ServiceError::InvalidArgument(format!("device_public_key: {e}")))?;
        if key_bytes.len() != 32 {
            return Err(ServiceError::InvalidArgument(format!(
                "device_public_key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        // Always a fresh identity: re-registration with a new key creates a
        // new device record, never a hash mutation of an existing one.
        let device_id = Uuid::new_v4().to_string();
        let dpk_hash = fingerprint_of(&key_bytes);

        let device = self
            .db
            .create_device(
                &device_id,
                user_id,
                req.device_name.trim(),
                req.device_type.as_str(),
                &dpk_hash,
                &req.app_version,
            )
            .await?;

        let certificate = self.signer.issue(
            user_id,
            &device.device_id,
            &device.device_public_key_hash,
            &req.app_version,
        )?;

        info!(user_id, device_id = %device.device_id, device_type = %req.device_type, "Device registered");

        Ok(RegisteredDevice {
            device_id: device.device_id,
            certificate,
            server_public_key: self.signer.public_key().to_b64(),
        })
    }

    /// Renew an existing certificate.
    ///
    /// The revocation check runs against the registry on every call and is
    /// never cached beyond the request: this is the bounded-latency
    /// revocation lever.
    pub async fn renew(
        &self,
        user_id: &str,
        device_id: &str,
        app_version: &str,
    ) -> Result<RenewedCertificate, ServiceError> {
        let device = self
            .db
            .get_device(device_id, user_id)
            .await?
            .ok_or(ServiceError::DeviceNotFound)?;

        if device.revoked() {
            warn!(user_id, device_id, "Renewal denied for revoked device");
            return Err(ServiceError::DeviceRevoked);
        }

        self.db.touch_renewed(device_id, app_version).await?;

        let certificate = self.signer.issue(
            user_id,
            device_id,
            &device.device_public_key_hash,
            app_version,
        )?;

        info!(user_id, device_id, "Certificate renewed");

        Ok(RenewedCertificate {
            device_id: device_id.to_string(),
            certificate,
        })
    }

    /// List all devices registered for a user, newest first.
    pub async fn list_devices(&self, user_id: &str) -> Result<Vec<DeviceSummary>, ServiceError> {
        let devices = self.db.list_devices(user_id).await?;
        Ok(devices.into_iter().map(DeviceSummary::from).collect())
    }

    /// Revoke a device. Already-issued certificates stay locally valid
    /// until their own expiry; the server simply refuses every renewal
    /// from now on. Idempotent.
    pub async fn revoke(&self, user_id: &str, device_id: &str) -> Result<(), ServiceError> {
        if self.db.get_device(device_id, user_id).await?.is_none() {
            return Err(ServiceError::DeviceNotFound);
        }

        self.db.revoke_device(device_id).await?;
        info!(user_id, device_id, "Device revoked");
        Ok(())
    }

    /// The server's OAC public key for client embedding. Unauthenticated.
    pub fn server_public_key(&self) -> PublicKeyInfo {
        let key = self.signer.public_key();
        PublicKeyInfo {
            public_key: key.to_b64(),
            fingerprint: key.fingerprint(),
        }
    }
}

//! Pitwall server library.
//!
//! Hosts the device key registry (SQLite) and the OAC issuance service.
//! Transport bindings live elsewhere; this crate exposes the boundary
//! operations (`register`, `renew`, `list_devices`, `revoke`,
//! `server_public_key`) to whatever routing layer fronts them.
//!
//! Startup contract: the OAC signing key is configuration, loaded once via
//! `CertificateSigner::from_key_file`; its absence is fatal
//! (`SigningUnavailable`), never a per-request condition.

pub mod service;
pub mod storage;

pub use service::{
    DeviceService, DeviceSummary, PublicKeyInfo, RegisterDevice, RegisteredDevice,
    RenewedCertificate, ServiceError,
};
pub use storage::{Database, DatabaseError, Device, DeviceClass};

use pitwall_oac::{CertificateSigner, OacError};

/// Wire up the device service from resolved configuration.
///
/// Loads the signing key (fatal if missing), opens the registry database,
/// and returns the ready service. Call once at process start.
pub async fn bootstrap(config: &pitwall_core::Config) -> Result<DeviceService, ServiceError> {
    let key_path = config.oac.signing_key_path.as_ref().ok_or_else(|| {
        ServiceError::Certificate(OacError::SigningUnavailable(
            "signing_key_path is not configured".to_string(),
        ))
    })?;
    let signer = CertificateSigner::from_key_file(key_path, config.oac.certificate_lifetime_secs)?;

    let db_path = config
        .server
        .database_path
        .clone()
        .or_else(pitwall_core::config::database_path)
        .ok_or_else(|| {
            ServiceError::InvalidArgument("no database path available".to_string())
        })?;
    let db = Database::open(&db_path).await?;

    Ok(DeviceService::new(db, signer))
}

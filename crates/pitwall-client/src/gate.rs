//! Offline access gate.
//!
//! Runs the three-step verification on launch when no network is present
//! and collapses every failure into one user-facing outcome. Which check
//! failed is logged for diagnostics but never shown, so probing the client
//! leaks nothing. Verification failures are never retried offline; retry
//! happens only by regaining connectivity and renewing.

use tracing::debug;

use pitwall_oac::{CertificateClaims, DeviceKeyPair, OfflineVerifier, ServerPublicKey};

use crate::error::ClientError;
use crate::store::CertificateBundle;

/// Check whether the stored bundle authorizes offline access right now.
///
/// Pure and synchronous with no I/O or shared state, so it is safe to run
/// on every app launch. Returns the verified claims, or the single
/// collapsed denial.
pub fn check_offline_access(
    bundle: &CertificateBundle,
    device: &DeviceKeyPair,
    now: i64,
    skew_tolerance_secs: i64,
) -> Result<CertificateClaims, ClientError> {
    let server_key = ServerPublicKey::from_b64(&bundle.server_public_key).map_err(|e| {
        debug!(reason = %e, "Offline access denied: stored server key unusable");
        ClientError::OfflineAccessDenied
    })?;

    let verifier = OfflineVerifier::new(server_key, skew_tolerance_secs);
    verifier
        .verify(&bundle.certificate, device, now)
        .map_err(|e| {
            debug!(device_id = %bundle.device_id, reason = %e, "Offline access denied");
            ClientError::OfflineAccessDenied
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pitwall_oac::{Certificate, CertificateSigner, DEFAULT_LIFETIME_SECS, ServerKeyPair};

    const SKEW: i64 = 300;
    const NOW: i64 = 1_700_000_000;

    fn setup() -> (CertificateBundle, DeviceKeyPair) {
        let signer = CertificateSigner::new(ServerKeyPair::generate(), DEFAULT_LIFETIME_SECS);
        let device = DeviceKeyPair::generate();
        let cert = signer
            .issue_at("u1", "d1", &device.public_key_hash(), "2.1.0", NOW)
            .unwrap();
        let bundle = CertificateBundle::new("d1", cert, signer.public_key().to_b64());
        (bundle, device)
    }

    #[test]
    fn valid_bundle_grants_offline_access() {
        let (bundle, device) = setup();
        let claims = check_offline_access(&bundle, &device, NOW, SKEW).unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn all_failure_modes_collapse_to_the_same_denial() {
        let (bundle, device) = setup();

        // Expired.
        let exp = bundle.certificate.decode().unwrap().claims.exp;
        let expired = check_offline_access(&bundle, &device, exp + SKEW + 1, SKEW).unwrap_err();

        // Tampered token.
        let mut tampered = bundle.clone();
        tampered.certificate = Certificate::from_token("oac1.forged.sig");
        let forged = check_offline_access(&tampered, &device, NOW, SKEW).unwrap_err();

        // Wrong device.
        let stranger = DeviceKeyPair::generate();
        let mismatched = check_offline_access(&bundle, &stranger, NOW, SKEW).unwrap_err();

        for err in [expired, forged, mismatched] {
            assert!(matches!(err, ClientError::OfflineAccessDenied));
            assert_eq!(err.to_string(), "Offline access unavailable, please reconnect");
        }
    }

    #[test]
    fn unusable_stored_server_key_is_also_just_denied() {
        let (mut bundle, device) = setup();
        bundle.server_public_key = "not-a-key".to_string();
        let err = check_offline_access(&bundle, &device, NOW, SKEW).unwrap_err();
        assert!(matches!(err, ClientError::OfflineAccessDenied));
    }
}

//! Opportunistic certificate renewal.
//!
//! Renewal is not a server responsibility: the client triggers it once per
//! successful network-available authentication cycle, piggybacking on the
//! online re-authentication flow. The transport is abstracted behind
//! `RenewalApi`; a cancelled or failed renewal must leave the stored
//! bundle untouched, which the store's transactional replace guarantees.

use tracing::{debug, warn};

use pitwall_oac::{Certificate, DeviceKeyPair, OfflineVerifier, ServerPublicKey, unix_now};

use crate::error::ClientError;
use crate::store::{CertificateBundle, CertificateStore};

/// Terminal renewal refusals from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDenial {
    /// The device was revoked; renewal will never succeed again for this
    /// device id. Re-registration is required.
    Revoked,
    /// The device record is gone; the client should re-register.
    NotFound,
}

impl std::fmt::Display for RenewalDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Revoked => f.write_str("device revoked"),
            Self::NotFound => f.write_str("device not found"),
        }
    }
}

/// Failure modes of one renewal attempt.
#[derive(Debug)]
pub enum RenewalError {
    /// The server explicitly refused; retrying is pointless.
    Denied(RenewalDenial),
    /// Network or transport trouble; the next online cycle retries.
    Transport(String),
}

/// Transport-side renewal call. Implemented over whatever channel fronts
/// the device service; tests implement it in-process.
pub trait RenewalApi {
    /// Request a fresh certificate token for the device.
    fn renew(
        &self,
        device_id: &str,
        app_version: &str,
    ) -> impl Future<Output = Result<String, RenewalError>> + Send;
}

/// What one renewal cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// A fresh, fully verified certificate replaced the stored one.
    Renewed,
    /// The server refused terminally; the bundle is now marked
    /// non-renewable but stays valid offline until its own expiry.
    Denied(RenewalDenial),
    /// Transient failure (transport, or an unverifiable response); the
    /// stored bundle is untouched.
    Failed,
    /// The bundle was already marked non-renewable; no request was made.
    SkippedDenied,
}

/// Runs the renewal cycle against a store.
pub struct RenewalScheduler<A> {
    api: A,
    store: CertificateStore,
    skew_tolerance_secs: i64,
    app_version: String,
}

impl<A: RenewalApi> RenewalScheduler<A> {
    pub fn new(
        api: A,
        store: CertificateStore,
        skew_tolerance_secs: i64,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            skew_tolerance_secs,
            app_version: app_version.into(),
        }
    }

    /// Run one renewal cycle. Call after every successful online
    /// authentication.
    ///
    /// The renewed certificate is verified end to end (signature,
    /// freshness, possession) against this device before it replaces the
    /// stored one; a response that does not verify is treated like a
    /// transport failure.
    pub async fn on_online_authenticated(
        &self,
        device: &DeviceKeyPair,
    ) -> Result<RenewalOutcome, ClientError> {
        let Some(bundle) = self.store.load()? else {
            return Err(ClientError::NoCertificate);
        };

        if bundle.renewal_denied {
            debug!(device_id = %bundle.device_id, "Renewal skipped: previously denied");
            return Ok(RenewalOutcome::SkippedDenied);
        }

        let token = match self.api.renew(&bundle.device_id, &self.app_version).await {
            Ok(token) => token,
            Err(RenewalError::Denied(denial)) => {
                warn!(device_id = %bundle.device_id, %denial, "Renewal denied by server");
                self.store.mark_renewal_denied()?;
                return Ok(RenewalOutcome::Denied(denial));
            }
            Err(RenewalError::Transport(reason)) => {
                debug!(device_id = %bundle.device_id, reason, "Renewal attempt failed");
                return Ok(RenewalOutcome::Failed);
            }
        };

        let certificate = Certificate::from_token(token);
        let server_key = ServerPublicKey::from_b64(&bundle.server_public_key)?;
        let verifier = OfflineVerifier::new(server_key, self.skew_tolerance_secs);

        if let Err(e) = verifier.verify(&certificate, device, unix_now()) {
            warn!(device_id = %bundle.device_id, reason = %e, "Renewed certificate failed verification; keeping previous one");
            return Ok(RenewalOutcome::Failed);
        }

        let fresh = CertificateBundle::new(
            bundle.device_id.clone(),
            certificate,
            bundle.server_public_key.clone(),
        );
        self.store.replace(&fresh)?;

        debug!(device_id = %bundle.device_id, "Certificate renewed and stored");
        Ok(RenewalOutcome::Renewed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pitwall_oac::{CertificateSigner, DEFAULT_LIFETIME_SECS, ServerKeyPair};

    const SKEW: i64 = 300;

    /// In-process stand-in for the server's renewal endpoint.
    enum FakeApi {
        Issue(CertificateSigner, String),
        Deny(RenewalDenial),
        Unreachable,
        Garbage,
    }

    impl RenewalApi for FakeApi {
        async fn renew(&self, device_id: &str, app_version: &str) -> Result<String, RenewalError> {
            match self {
                Self::Issue(signer, dpk_hash) => Ok(signer
                    .issue("u1", device_id, dpk_hash, app_version)
                    .map_err(|e| RenewalError::Transport(e.to_string()))?
                    .token()
                    .to_string()),
                Self::Deny(denial) => Err(RenewalError::Denied(*denial)),
                Self::Unreachable => {
                    Err(RenewalError::Transport("connection refused".to_string()))
                }
                Self::Garbage => Ok("oac1.garbage.sig".to_string()),
            }
        }
    }

    struct Setup {
        signer: CertificateSigner,
        device: DeviceKeyPair,
        store: CertificateStore,
        _dir: tempfile::TempDir,
    }

    fn setup() -> Setup {
        let dir = tempfile::TempDir::new().unwrap();
        let signer = CertificateSigner::new(ServerKeyPair::generate(), DEFAULT_LIFETIME_SECS);
        let device = DeviceKeyPair::generate();
        let store = CertificateStore::new(dir.path().join("bundle.json"));

        let cert = signer
            .issue("u1", "d1", &device.public_key_hash(), "2.1.0")
            .unwrap();
        store
            .replace(&CertificateBundle::new(
                "d1",
                cert,
                signer.public_key().to_b64(),
            ))
            .unwrap();

        Setup {
            signer,
            device,
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn successful_renewal_replaces_the_bundle() {
        let s = setup();
        let old_token = s.store.load().unwrap().unwrap().certificate.token().to_string();

        let hash = s.device.public_key_hash();
        let scheduler = RenewalScheduler::new(
            FakeApi::Issue(s.signer, hash),
            s.store.clone(),
            SKEW,
            "2.2.0",
        );

        let outcome = scheduler.on_online_authenticated(&s.device).await.unwrap();
        assert_eq!(outcome, RenewalOutcome::Renewed);

        let new = s.store.load().unwrap().unwrap();
        assert_ne!(new.certificate.token(), old_token);
        assert!(!new.renewal_denied);
    }

    #[tokio::test]
    async fn denial_marks_bundle_and_keeps_certificate() {
        let s = setup();
        let old_token = s.store.load().unwrap().unwrap().certificate.token().to_string();

        let scheduler = RenewalScheduler::new(
            FakeApi::Deny(RenewalDenial::Revoked),
            s.store.clone(),
            SKEW,
            "2.1.0",
        );

        let outcome = scheduler.on_online_authenticated(&s.device).await.unwrap();
        assert_eq!(outcome, RenewalOutcome::Denied(RenewalDenial::Revoked));

        // The certificate stays for offline use until its own expiry.
        let bundle = s.store.load().unwrap().unwrap();
        assert!(bundle.renewal_denied);
        assert_eq!(bundle.certificate.token(), old_token);

        // And no further request is made.
        let outcome = scheduler.on_online_authenticated(&s.device).await.unwrap();
        assert_eq!(outcome, RenewalOutcome::SkippedDenied);
    }

    #[tokio::test]
    async fn transport_failure_leaves_bundle_untouched() {
        let s = setup();
        let before = s.store.load().unwrap().unwrap();

        let scheduler =
            RenewalScheduler::new(FakeApi::Unreachable, s.store.clone(), SKEW, "2.1.0");

        let outcome = scheduler.on_online_authenticated(&s.device).await.unwrap();
        assert_eq!(outcome, RenewalOutcome::Failed);

        let after = s.store.load().unwrap().unwrap();
        assert_eq!(after.certificate.token(), before.certificate.token());
        assert!(!after.renewal_denied);
    }

    #[tokio::test]
    async fn unverifiable_response_never_overwrites_the_store() {
        let s = setup();
        let before = s.store.load().unwrap().unwrap();

        let scheduler = RenewalScheduler::new(FakeApi::Garbage, s.store.clone(), SKEW, "2.1.0");

        let outcome = scheduler.on_online_authenticated(&s.device).await.unwrap();
        assert_eq!(outcome, RenewalOutcome::Failed);

        let after = s.store.load().unwrap().unwrap();
        assert_eq!(after.certificate.token(), before.certificate.token());
    }

    #[tokio::test]
    async fn renewal_without_registration_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path().join("bundle.json"));
        let scheduler = RenewalScheduler::new(FakeApi::Unreachable, store, SKEW, "2.1.0");

        let err = scheduler
            .on_online_authenticated(&DeviceKeyPair::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoCertificate));
    }
}

//! Offline certificate verification.
//!
//! The verifier holds only the server's public key, never a secret, and
//! runs the three-step protocol entirely locally. All three checks must
//! pass; any failure means offline authorization is denied. Each call is a
//! pure function of (certificate, server public key, device keypair,
//! current time).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::certificate::{Certificate, CertificateClaims};
use crate::device::{DeviceKeyPair, fingerprint_of, prove_possession};
use crate::error::OacError;

/// The server's public verification key as distributed to clients
/// (embedded at build time, fetchable at runtime).
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerPublicKey {
    key: VerifyingKey,
}

impl std::fmt::Debug for ServerPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPublicKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl ServerPublicKey {
    pub(crate) const fn from_verifying_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse from raw 32-byte key material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OacError> {
        if bytes.len() != 32 {
            return Err(OacError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let key = VerifyingKey::from_bytes(&arr)
            .map_err(|e| OacError::Encoding(format!("server public key: {e}")))?;
        Ok(Self { key })
    }

    /// Parse from the base64url form used on the wire and in client storage.
    pub fn from_b64(s: &str) -> Result<Self, OacError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| OacError::Encoding(format!("server public key: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Base64url form for distribution and storage.
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.key.to_bytes())
    }

    /// Colon-hex SHA-256 fingerprint for operator/user display.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.key.to_bytes())
    }

    fn verify_signature(&self, message: &[u8], signature: &Signature) -> Result<(), OacError> {
        self.key
            .verify(message, signature)
            .map_err(|_| OacError::InvalidSignature)
    }
}

impl TryFrom<String> for ServerPublicKey {
    type Error = OacError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_b64(&s)
    }
}

impl From<ServerPublicKey> for String {
    fn from(key: ServerPublicKey) -> Self {
        key.to_b64()
    }
}

/// Client-side verifier for offline authorization certificates.
#[derive(Debug, Clone)]
pub struct OfflineVerifier {
    server_key: ServerPublicKey,
    skew_tolerance_secs: i64,
}

impl OfflineVerifier {
    /// Build a verifier around the embedded server public key.
    pub const fn new(server_key: ServerPublicKey, skew_tolerance_secs: i64) -> Self {
        Self {
            server_key,
            skew_tolerance_secs,
        }
    }

    pub const fn skew_tolerance_secs(&self) -> i64 {
        self.skew_tolerance_secs
    }

    /// Run the full three-step offline verification at time `now`.
    ///
    /// Step order matters only for early exit: the signature check is the
    /// cheapest way to definitively reject forged data, so it runs first.
    /// Returns the verified claims on success.
    ///
    /// 1. Signature: strict decode plus Ed25519 verification plus the
    ///    fixed scope/type markers. Any decode failure or unsupported
    ///    format prefix fails closed as `InvalidSignature`; a client
    ///    never accepts a certificate whose scheme it does not trust.
    /// 2. Freshness: `exp` against `now` with the skew tolerance in both
    ///    directions (`CertificateExpired`).
    /// 3. Possession: fresh challenge signed by the device key and the
    ///    hash binding against the certificate (`DeviceMismatch`).
    pub fn verify(
        &self,
        certificate: &Certificate,
        device: &DeviceKeyPair,
        now: i64,
    ) -> Result<CertificateClaims, OacError> {
        // Step 1: signature.
        let decoded = certificate.decode().map_err(|e| {
            tracing::debug!(reason = %e, "Certificate rejected at decode");
            OacError::InvalidSignature
        })?;
        self.server_key
            .verify_signature(&decoded.claims_bytes, &decoded.signature)?;
        if !decoded.claims.has_expected_markers() {
            tracing::debug!(
                scope = %decoded.claims.scope,
                typ = %decoded.claims.typ,
                "Certificate rejected: unexpected scope/type markers"
            );
            return Err(OacError::InvalidSignature);
        }

        // Step 2: freshness.
        let claims = decoded.claims;
        if claims.is_expired(now, self.skew_tolerance_secs)
            || claims.is_premature(now, self.skew_tolerance_secs)
        {
            return Err(OacError::CertificateExpired);
        }

        // Step 3: device possession.
        prove_possession(device, &claims.dpk_hash)?;

        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::certificate::Certificate;
    use crate::signer::{CertificateSigner, DEFAULT_LIFETIME_SECS, ServerKeyPair};

    const SKEW: i64 = 300;
    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        signer: CertificateSigner,
        device: DeviceKeyPair,
        verifier: OfflineVerifier,
    }

    impl Fixture {
        fn new() -> Self {
            let signer = CertificateSigner::new(ServerKeyPair::generate(), DEFAULT_LIFETIME_SECS);
            let verifier = OfflineVerifier::new(signer.public_key(), SKEW);
            Self {
                signer,
                device: DeviceKeyPair::generate(),
                verifier,
            }
        }

        fn issue(&self, iat: i64) -> Certificate {
            self.signer
                .issue_at("user-1", "device-1", &self.device.public_key_hash(), "2.1.0", iat)
                .unwrap()
        }
    }

    #[test]
    fn valid_certificate_passes_all_three_steps() {
        let fx = Fixture::new();
        let cert = fx.issue(NOW);

        let claims = fx.verifier.verify(&cert, &fx.device, NOW).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.device_id, "device-1");
    }

    #[test]
    fn any_bit_flip_in_encoded_form_fails() {
        let fx = Fixture::new();
        let token = fx.issue(NOW).token().to_string();

        // Flip one character in every segment in turn.
        for pos in [6, token.rfind('.').unwrap() + 3] {
            let mut bytes = token.clone().into_bytes();
            bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
            let tampered = Certificate::from_token(String::from_utf8(bytes).unwrap());

            let err = fx.verifier.verify(&tampered, &fx.device, NOW).unwrap_err();
            assert!(matches!(err, OacError::InvalidSignature), "pos {pos}: {err:?}");
        }
    }

    #[test]
    fn certificate_from_foreign_server_key_fails() {
        let fx = Fixture::new();
        let forger = CertificateSigner::new(ServerKeyPair::generate(), DEFAULT_LIFETIME_SECS);
        let forged = forger
            .issue_at("user-1", "device-1", &fx.device.public_key_hash(), "2.1.0", NOW)
            .unwrap();

        let err = fx.verifier.verify(&forged, &fx.device, NOW).unwrap_err();
        assert!(matches!(err, OacError::InvalidSignature));
    }

    #[test]
    fn unsupported_format_prefix_fails_closed() {
        let fx = Fixture::new();
        let token = fx.issue(NOW).token().replacen("oac1", "hs256", 1);

        let err = fx
            .verifier
            .verify(&Certificate::from_token(token), &fx.device, NOW)
            .unwrap_err();
        assert!(matches!(err, OacError::InvalidSignature));
    }

    #[test]
    fn expiry_boundary_with_skew_tolerance() {
        let fx = Fixture::new();
        let cert = fx.issue(NOW);
        let exp = NOW + DEFAULT_LIFETIME_SECS;

        // Accepted at expiry and up to the edge of the skew window.
        assert!(fx.verifier.verify(&cert, &fx.device, exp).is_ok());
        assert!(fx.verifier.verify(&cert, &fx.device, exp + SKEW - 1).is_ok());

        // Rejected one second past the window.
        let err = fx
            .verifier
            .verify(&cert, &fx.device, exp + SKEW + 1)
            .unwrap_err();
        assert!(matches!(err, OacError::CertificateExpired));
    }

    #[test]
    fn certificate_from_the_future_is_rejected() {
        let fx = Fixture::new();
        let cert = fx.issue(NOW + SKEW + 61);

        let err = fx.verifier.verify(&cert, &fx.device, NOW).unwrap_err();
        assert!(matches!(err, OacError::CertificateExpired));
    }

    #[test]
    fn wrong_device_key_fails_possession_even_when_signed_and_fresh() {
        let fx = Fixture::new();
        let cert = fx.issue(NOW);
        let other_device = DeviceKeyPair::generate();

        let err = fx.verifier.verify(&cert, &other_device, NOW).unwrap_err();
        assert!(matches!(err, OacError::DeviceMismatch));
    }

    #[test]
    fn foreign_scope_marker_fails_even_with_valid_signature() {
        // A correctly signed token with a non-OAC scope marker (e.g. an
        // online session token shoved into the offline path) must not pass.
        let keys = ServerKeyPair::generate();
        let device = DeviceKeyPair::generate();
        let verifier = OfflineVerifier::new(keys.public_key(), SKEW);

        let mut claims = CertificateClaims::new(
            "user-1",
            "device-1",
            device.public_key_hash(),
            NOW,
            NOW + 3600,
            "2.1.0",
        );
        claims.scope = "session".to_string();
        let claims_bytes = serde_json::to_vec(&claims).unwrap();
        let cert = Certificate::from_signed_parts(&claims_bytes, &keys.sign(&claims_bytes));

        let err = verifier.verify(&cert, &device, NOW).unwrap_err();
        assert!(matches!(err, OacError::InvalidSignature));
    }

    #[test]
    fn server_public_key_b64_roundtrip() {
        let keys = ServerKeyPair::generate();
        let public = keys.public_key();

        let parsed = ServerPublicKey::from_b64(&public.to_b64()).unwrap();
        assert_eq!(parsed.to_b64(), public.to_b64());
        assert_eq!(parsed.fingerprint(), public.fingerprint());
    }

    #[test]
    fn server_public_key_rejects_bad_input() {
        assert!(ServerPublicKey::from_b64("!!!not-base64!!!").is_err());
        assert!(ServerPublicKey::from_bytes(&[0u8; 16]).is_err());
    }
}

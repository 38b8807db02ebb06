//! Certificate claim set and compact wire form.
//!
//! An OAC is a signed, immutable assertion: a JSON claim set and an Ed25519
//! signature over those exact bytes, carried as a three-segment string
//! `oac1.<base64url(claims)>.<base64url(signature)>`. The fixed `oac1`
//! prefix pins the signature scheme; a client must reject any other prefix
//! rather than fall back to something forgeable.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};

use crate::error::OacError;

/// Wire-form prefix identifying version 1 of the OAC format (Ed25519 over
/// JSON claims).
pub const WIRE_PREFIX: &str = "oac1";

/// Fixed scope marker distinguishing an OAC from online session tokens.
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// Fixed type discriminator carried in every certificate.
pub const TYPE_OAC: &str = "oac";

/// The claim set signed into every certificate.
///
/// `exp - iat` is fixed by server configuration and never client-
/// controllable; any mutation of the encoded claims invalidates the
/// signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateClaims {
    /// Subject user id.
    pub sub: String,
    /// Registered device id this certificate is bound to.
    pub device_id: String,
    /// Colon-hex SHA-256 fingerprint of the device's public key.
    pub dpk_hash: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Always `offline_access`.
    pub scope: String,
    /// Always `oac`.
    pub typ: String,
    /// App version string at issuance.
    pub app_version: String,
}

impl CertificateClaims {
    /// Build a claim set with the fixed scope and type markers.
    pub fn new(
        sub: impl Into<String>,
        device_id: impl Into<String>,
        dpk_hash: impl Into<String>,
        iat: i64,
        exp: i64,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            sub: sub.into(),
            device_id: device_id.into(),
            dpk_hash: dpk_hash.into(),
            iat,
            exp,
            scope: SCOPE_OFFLINE_ACCESS.to_string(),
            typ: TYPE_OAC.to_string(),
            app_version: app_version.into(),
        }
    }

    /// Whether the scope and type markers are the ones this subsystem
    /// issues. A signed token with foreign markers is not an OAC.
    pub fn has_expected_markers(&self) -> bool {
        self.scope == SCOPE_OFFLINE_ACCESS && self.typ == TYPE_OAC
    }

    /// Expired check with clock-skew tolerance: only expired once `now`
    /// is past `exp` by more than `skew_secs`.
    pub const fn is_expired(&self, now: i64, skew_secs: i64) -> bool {
        now > self.exp + skew_secs
    }

    /// A certificate issued further in the future than the skew window is
    /// not yet valid; a badly wrong local clock must not widen trust.
    pub const fn is_premature(&self, now: i64, skew_secs: i64) -> bool {
        self.iat > now + skew_secs
    }
}

/// A certificate in its signed wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Certificate {
    token: String,
}

/// A strictly decoded certificate: parsed claims plus the exact signed
/// bytes and the signature over them.
#[derive(Debug, Clone)]
pub struct DecodedCertificate {
    pub claims: CertificateClaims,
    pub claims_bytes: Vec<u8>,
    pub signature: Signature,
}

impl Certificate {
    /// Wrap an opaque token received from storage or the wire. No
    /// validation happens here; `decode` is strict.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// The compact token string.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Assemble the wire form from the exact claim bytes that were signed.
    pub(crate) fn from_signed_parts(claims_bytes: &[u8], signature: &Signature) -> Self {
        let token = format!(
            "{WIRE_PREFIX}.{}.{}",
            URL_SAFE_NO_PAD.encode(claims_bytes),
            URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        );
        Self { token }
    }

    /// Strict decode of the three-segment wire form.
    ///
    /// Fails on a wrong segment count, an unsupported prefix, bad base64,
    /// bad claim JSON, or a signature of the wrong length. Decoding does
    /// NOT check the signature; that is the verifier's first step.
    pub fn decode(&self) -> Result<DecodedCertificate, OacError> {
        let mut segments = self.token.split('.');
        let (prefix, claims_seg, sig_seg) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(p), Some(c), Some(s), None) => (p, c, s),
                _ => {
                    return Err(OacError::Encoding(
                        "expected three dot-separated segments".to_string(),
                    ));
                }
            };

        if prefix != WIRE_PREFIX {
            return Err(OacError::Encoding(format!(
                "unsupported certificate format prefix: {prefix:?}"
            )));
        }

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_seg)
            .map_err(|e| OacError::Encoding(format!("claims segment: {e}")))?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_seg)
            .map_err(|e| OacError::Encoding(format!("signature segment: {e}")))?;

        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| OacError::Encoding(format!("signature: {e}")))?;

        let claims: CertificateClaims = serde_json::from_slice(&claims_bytes)
            .map_err(|e| OacError::Encoding(format!("claims JSON: {e}")))?;

        Ok(DecodedCertificate {
            claims,
            claims_bytes,
            signature,
        })
    }
}

impl std::fmt::Display for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

/// Current time as seconds since epoch.
#[allow(clippy::cast_possible_wrap)]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

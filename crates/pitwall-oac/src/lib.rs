//! Pitwall Offline Authorization Certificates (OAC)
//!
//! Grants a previously-authenticated user continued access when no network
//! path to the server exists, without allowing that access to be forged or
//! copied across devices. Sits above the online session system and is
//! consulted only when online verification is impossible.
//!
//! ## Building blocks
//!
//! - **Certificate**: Ed25519-signed JSON claim set, wire form
//!   `oac1.<claims>.<sig>`, fixed 7-day lifetime (14-day hard ceiling)
//! - **Signer**: server-side issuance/renewal with the single deployment
//!   signing key; key absence is startup-fatal
//! - **Verifier**: the client-side three-step protocol of signature,
//!   freshness (±5 min skew tolerance by default), and device-possession
//!   proof
//! - **Device keys**: one Ed25519 keypair per device; the server only ever
//!   sees its hash, which is the basis of the anti-copy guarantee
//!
//! Revocation is bounded-latency by design: it blocks renewal but cannot
//! invalidate an already-issued, unexpired certificate.

pub mod certificate;
pub mod device;
pub mod error;
pub mod signer;
pub mod verifier;

pub use certificate::{
    Certificate, CertificateClaims, DecodedCertificate, SCOPE_OFFLINE_ACCESS, TYPE_OAC,
    WIRE_PREFIX, unix_now,
};
pub use device::{
    CHALLENGE_LEN, DeviceKeyPair, constant_time_str_eq, fingerprint_of, prove_possession,
};
pub use error::OacError;
pub use signer::{CertificateSigner, DEFAULT_LIFETIME_SECS, LIFETIME_CEILING_SECS, ServerKeyPair};
pub use verifier::{OfflineVerifier, ServerPublicKey};

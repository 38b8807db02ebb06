//! OAC error types.

/// Errors from certificate and key operations.
#[derive(Debug, thiserror::Error)]
pub enum OacError {
    /// The server signing key could not be loaded. Fatal at startup; the
    /// issuing side must not come up without it.
    #[error("Signing key unavailable: {0}")]
    SigningUnavailable(String),

    /// Signature mismatch, malformed wire form, or unsupported algorithm.
    /// All three fail closed into this one variant.
    #[error("Invalid certificate signature")]
    InvalidSignature,

    /// The certificate is outside its validity window even after the
    /// clock-skew tolerance. The caller must require connectivity.
    #[error("Certificate expired")]
    CertificateExpired,

    /// The device could not prove possession of the private key matching
    /// the hash embedded in the certificate.
    #[error("Device key mismatch")]
    DeviceMismatch,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Wire-form encode/decode failure. Collapsed into `InvalidSignature`
    /// by the verifier; kept distinguishable for diagnostics.
    #[error("Certificate encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

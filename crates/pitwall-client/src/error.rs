//! Client error types.

use pitwall_oac::OacError;

/// Errors from client-side certificate handling.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The single user-facing outcome for every offline verification
    /// failure. Which of the three checks failed is logged internally but
    /// never surfaced, so a probing attacker learns nothing from the
    /// message.
    #[error("Offline access unavailable, please reconnect")]
    OfflineAccessDenied,

    /// No certificate bundle is stored yet; the device must register.
    #[error("No certificate stored")]
    NoCertificate,

    #[error("Certificate store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Oac(#[from] OacError),
}

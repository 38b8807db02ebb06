//! Pitwall client library.
//!
//! Everything the app needs to keep working offline after one online
//! registration:
//!
//! - `CertificateStore`: persists the certificate bundle, transactional
//!   replace so renewal can never corrupt or half-overwrite it
//! - `RenewalScheduler`: renews opportunistically whenever the online
//!   authentication cycle succeeds, and stops for good once the server
//!   says revoked/not-found
//! - `check_offline_access`: the launch-time gate; one collapsed denial
//!   for every verification failure
//!
//! The cryptographic verification itself lives in `pitwall-oac`.

pub mod error;
pub mod gate;
pub mod scheduler;
pub mod store;

pub use error::ClientError;
pub use gate::check_offline_access;
pub use scheduler::{RenewalApi, RenewalDenial, RenewalError, RenewalOutcome, RenewalScheduler};
pub use store::{CertificateBundle, CertificateStore};

//! `SQLite` storage for the device key registry.
//!
//! Durable mapping from device identity to the hash of its public key and
//! its revocation state. No cryptographic logic lives here.

mod db;
mod models;
mod queries;

pub use db::{Database, DatabaseError};
pub use models::*;

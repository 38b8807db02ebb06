//! Database connection and initialization.

pub use pitwall_core::db::DatabaseError;

pitwall_core::define_database!(Database, "Device registry migrations complete");

//! Database queries for the device registry.

use pitwall_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::Device;

impl Database {
    /// Create a new device row. Always starts un-revoked; the public-key
    /// hash set here is never updated in place.
    pub async fn create_device(
        &self,
        device_id: &str,
        user_id: &str,
        device_name: &str,
        device_type: &str,
        device_public_key_hash: &str,
        app_version: &str,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO devices (device_id, user_id, device_name, device_type,
                                 device_public_key_hash, app_version, registered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(device_id)
        .bind(user_id)
        .bind(device_name)
        .bind(device_type)
        .bind(device_public_key_hash)
        .bind(app_version)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device(device_id, user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {device_id}")))
    }

    /// Get a device by id, scoped to its owning user.
    pub async fn get_device(
        &self,
        device_id: &str,
        user_id: &str,
    ) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE device_id = ? AND user_id = ?",
        )
        .bind(device_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(device)
    }

    /// List all devices registered for a user, newest registration first.
    pub async fn list_devices(&self, user_id: &str) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE user_id = ? ORDER BY registered_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// Mark a device revoked. Monotonic and idempotent: revoking an
    /// already-revoked device is a no-op success, and no un-revoke exists.
    pub async fn revoke_device(&self, device_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET is_revoked = 1 WHERE device_id = ?")
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Record a successful renewal. The renewal path is the only writer of
    /// `last_renewed`; it also refreshes the app version reported by the
    /// client.
    pub async fn touch_renewed(
        &self,
        device_id: &str,
        app_version: &str,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("UPDATE devices SET last_renewed = ?, app_version = ? WHERE device_id = ?")
            .bind(now)
            .bind(app_version)
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}

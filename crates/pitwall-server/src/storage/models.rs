//! Database models for the device registry.

use serde::{Deserialize, Serialize};

/// Device record from the database.
///
/// `device_public_key_hash` never changes in place once set; `is_revoked`
/// is only ever set to 1 and never reset.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub device_id: String,
    pub user_id: String,
    pub device_name: String,
    pub device_type: String,
    pub device_public_key_hash: String,
    pub app_version: String,
    pub is_revoked: i64,
    pub registered_at: i64,
    pub last_renewed: Option<i64>,
}

impl Device {
    pub const fn revoked(&self) -> bool {
        self.is_revoked != 0
    }
}

/// Platform tag for a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Android,
    Ios,
    Windows,
    Linux,
    Macos,
}

impl DeviceClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Macos => "macos",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

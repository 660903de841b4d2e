use thiserror::Error;

/// Failure reported by a `SettingsStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DispenserError {
    /// Non-fatal; the caller keeps its defaults.
    #[error("failed to load settings: {0}")]
    SettingsLoad(String),
    #[error("failed to save settings: {0}")]
    SettingsSave(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("notification permission denied")]
    NotificationPermissionDenied,
    #[error("notification dispatch failed: {0}")]
    NotificationDispatch(String),
    #[error("dispenser service has stopped")]
    ServiceStopped,
}

// Notifier — user-facing notifications.
// Every `DispenserEvent` maps to exactly one notification with fixed text.
// Delivery belongs to the host through the `Notifier` capability.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::constants::FULL_LEVEL;
use crate::error::DispenserError;
use crate::types::DispenserEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_event(event: &DispenserEvent) -> Self {
        match event {
            DispenserEvent::LowWater { threshold } => Self {
                title: "Low Water Level".into(),
                body: format!(
                    "Water dispenser is below {}%! Please refill soon.",
                    threshold
                ),
            },
            DispenserEvent::Empty => Self {
                title: "Water Dispenser Empty".into(),
                body: "The water level is at 0%. Please refill immediately to continue usage."
                    .into(),
            },
            DispenserEvent::Refilled => Self {
                title: "Water Refilled".into(),
                body: format!("The water dispenser has been refilled to {}%.", FULL_LEVEL),
            },
        }
    }
}

pub trait Notifier {
    /// Ask the platform for permission to post notifications.
    fn request_permission(&mut self) -> Result<(), DispenserError>;

    fn deliver(&mut self, notification: &Notification) -> Result<(), DispenserError>;
}

/// Posts notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn request_permission(&mut self) -> Result<(), DispenserError> {
        Ok(())
    }

    fn deliver(&mut self, notification: &Notification) -> Result<(), DispenserError> {
        info!(title = %notification.title, body = %notification.body, "notification");
        Ok(())
    }
}

/// Keeps every delivered notification in memory. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<Notification>>>,
    deny_permission: bool,
    fail_delivery: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose permission request is always refused.
    pub fn denying() -> Self {
        Self {
            deny_permission: true,
            ..Self::default()
        }
    }

    /// Make subsequent deliveries fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.fail_delivery.lock() {
            *flag = failing;
        }
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn titles(&self) -> Vec<String> {
        self.delivered().into_iter().map(|n| n.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn request_permission(&mut self) -> Result<(), DispenserError> {
        if self.deny_permission {
            return Err(DispenserError::NotificationPermissionDenied);
        }
        Ok(())
    }

    fn deliver(&mut self, notification: &Notification) -> Result<(), DispenserError> {
        let failing = self.fail_delivery.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(DispenserError::NotificationDispatch(format!(
                "could not post '{}'",
                notification.title
            )));
        }
        let mut log = self
            .delivered
            .lock()
            .map_err(|e| DispenserError::NotificationDispatch(e.to_string()))?;
        log.push(notification.clone());
        Ok(())
    }
}

// Types — the dispenser's data model.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::DispenserError;

/// Remaining water as an integer percentage, 0..=100.
pub type Level = u8;

/// Volume in millilitres.
pub type Millilitres = u32;

/// Whether a dispensing run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispensingState {
    Idle,
    Dispensing,
}

/// User-tunable settings, persisted as a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Percentage at or below which the low-water alert fires.
    pub low_water_threshold: Level,
    /// Milliseconds per 1% step.
    pub dispensing_speed: u64,
    /// Millilitres per 1% step.
    pub dispensing_volume: Millilitres,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            low_water_threshold: DEFAULT_LOW_WATER_THRESHOLD,
            dispensing_speed: DEFAULT_DISPENSING_SPEED_MS,
            dispensing_volume: DEFAULT_DISPENSING_VOLUME_ML,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), DispenserError> {
        if self.low_water_threshold > FULL_LEVEL {
            return Err(DispenserError::InvalidSettings(format!(
                "low water threshold {}% exceeds {}%",
                self.low_water_threshold, FULL_LEVEL
            )));
        }
        if self.dispensing_speed == 0 {
            return Err(DispenserError::InvalidSettings(
                "dispensing speed must be at least 1 ms".into(),
            ));
        }
        if self.dispensing_volume == 0 {
            return Err(DispenserError::InvalidSettings(
                "dispensing volume must be at least 1 ml".into(),
            ));
        }
        Ok(())
    }

    /// Interval between two ticks of a dispensing run.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.dispensing_speed)
    }
}

/// One entry of the usage ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageHistoryItem {
    pub timestamp: DateTime<Utc>,
    /// Dispensed volume; 0 for refill entries.
    pub amount: Millilitres,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl UsageHistoryItem {
    pub fn dispensed(timestamp: DateTime<Utc>, amount: Millilitres) -> Self {
        Self {
            timestamp,
            amount,
            event: None,
        }
    }

    pub fn refill(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            amount: 0,
            event: Some(REFILL_TAG.to_string()),
        }
    }

    pub fn is_refill(&self) -> bool {
        self.event.as_deref() == Some(REFILL_TAG)
    }
}

/// Alert bookkeeping shared between the threshold watch and the notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    /// Set once the low-water alert has fired; cleared when level rises above threshold.
    pub low_water_alerted: bool,
    /// Sticky collaborator failure; suppresses further notifications while set.
    pub last_error: Option<String>,
}

/// Full dispenser state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub level: Level,
    pub dispensing: DispensingState,
    /// Level captured when the current run began.
    pub run_start_level: Level,
    /// Oldest first, at most `HISTORY_CAPACITY` entries.
    pub history: VecDeque<UsageHistoryItem>,
    pub notification: NotificationState,
}

impl State {
    pub fn with_level(level: Level) -> Self {
        let level = level.min(FULL_LEVEL);
        Self {
            level,
            dispensing: DispensingState::Idle,
            run_start_level: level,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            notification: NotificationState::default(),
        }
    }

    pub fn is_dispensing(&self) -> bool {
        self.dispensing == DispensingState::Dispensing
    }
}

impl Default for State {
    fn default() -> Self {
        Self::with_level(FULL_LEVEL)
    }
}

/// Domain events raised by transitions, forwarded to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenserEvent {
    LowWater { threshold: Level },
    Empty,
    Refilled,
}

/// Labels for each transition, enabling deterministic trace replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionLabel {
    NoAction,
    Start,
    Tick,
    Stop,
    Refill,
}

impl std::fmt::Display for TransitionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result of a pure transition function.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub success: bool,
    pub new_state: State,
    pub events: Vec<DispenserEvent>,
}

impl TransitionResult {
    pub fn rejected(state: &State) -> Self {
        Self {
            success: false,
            new_state: state.clone(),
            events: Vec::new(),
        }
    }
}

/// Read model handed to display collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub level: Level,
    pub dispensing: DispensingState,
    pub history: Vec<UsageHistoryItem>,
    pub notification_error: Option<String>,
    pub settings: Settings,
}

impl std::fmt::Display for DispensingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::fmt::Display for DispenserEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispenserEvent::LowWater { threshold } => write!(f, "low-water({}%)", threshold),
            DispenserEvent::Empty => write!(f, "empty"),
            DispenserEvent::Refilled => write!(f, "refilled"),
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  level:             {}%", self.level)?;
        writeln!(f, "  dispensing:        {}", self.dispensing)?;
        writeln!(f, "  run_start_level:   {}%", self.run_start_level)?;
        writeln!(
            f,
            "  low_water_alerted: {}",
            self.notification.low_water_alerted
        )?;
        write!(f, "  history:           [")?;
        for (i, item) in self.history.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &item.event {
                Some(tag) => write!(f, "{}", tag)?,
                None => write!(f, "{} ml", item.amount)?,
            }
        }
        write!(f, "]")
    }
}

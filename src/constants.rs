// Constants — fixed limits and factory defaults for the dispenser.

use crate::types::{Level, Millilitres};

// Level bounds (percent)
pub const FULL_LEVEL: Level = 100;
pub const EMPTY_LEVEL: Level = 0;

// Usage ledger keeps only the most recent entries
pub const HISTORY_CAPACITY: usize = 5;

// Factory settings
pub const DEFAULT_LOW_WATER_THRESHOLD: Level = 20;
pub const DEFAULT_DISPENSING_SPEED_MS: u64 = 1000;
pub const DEFAULT_DISPENSING_VOLUME_ML: Millilitres = 10;

/// Key under which the settings record lives in the key-value store.
pub const SETTINGS_KEY: &str = "waterDispenserSettings";

/// Tag attached to ledger entries produced by `refill`.
pub const REFILL_TAG: &str = "Refill";

// Nondeterministic selection sets for the simulator
pub const THRESHOLDS: &[Level] = &[0, 5, 10, 20, 50, 99, 100];
pub const INITIAL_LEVELS: &[Level] = &[0, 1, 3, 20, 21, 50, 100];

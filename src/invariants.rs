// Safety invariants — must hold after every transition.

use crate::constants::*;
use crate::types::*;

pub fn level_within_bounds(state: &State, _settings: &Settings) -> bool {
    state.level <= FULL_LEVEL
}

pub fn history_within_capacity(state: &State, _settings: &Settings) -> bool {
    state.history.len() <= HISTORY_CAPACITY
}

pub fn history_chronological(state: &State, _settings: &Settings) -> bool {
    state
        .history
        .iter()
        .zip(state.history.iter().skip(1))
        .all(|(earlier, later)| earlier.timestamp <= later.timestamp)
}

/// An empty dispenser cannot still be running.
pub fn empty_implies_idle(state: &State, _settings: &Settings) -> bool {
    if state.level == EMPTY_LEVEL {
        state.dispensing == DispensingState::Idle
    } else {
        true
    }
}

pub fn run_start_covers_level(state: &State, _settings: &Settings) -> bool {
    if state.is_dispensing() {
        state.run_start_level >= state.level
    } else {
        true
    }
}

/// The low-water alert is re-armed whenever the level sits above threshold.
pub fn alert_cleared_above_threshold(state: &State, settings: &Settings) -> bool {
    if state.level > settings.low_water_threshold {
        !state.notification.low_water_alerted
    } else {
        true
    }
}

/// All individual invariants with names for reporting.
pub const ALL_INVARIANTS: &[(&str, fn(&State, &Settings) -> bool)] = &[
    ("levelWithinBounds", level_within_bounds),
    ("historyWithinCapacity", history_within_capacity),
    ("historyChronological", history_chronological),
    ("emptyImpliesIdle", empty_implies_idle),
    ("runStartCoversLevel", run_start_covers_level),
    ("alertClearedAboveThreshold", alert_cleared_above_threshold),
];

pub fn safety_invariant(state: &State, settings: &Settings) -> bool {
    ALL_INVARIANTS.iter().all(|(_, check)| check(state, settings))
}

/// Check all invariants and return the name of the first violated one, if any.
pub fn check_invariants(state: &State, settings: &Settings) -> Result<(), &'static str> {
    for (name, check) in ALL_INVARIANTS {
        if !check(state, settings) {
            return Err(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_safe() {
        assert!(safety_invariant(&State::default(), &Settings::default()));
        assert!(safety_invariant(&State::with_level(0), &Settings::default()));
    }

    #[test]
    fn running_while_empty_is_reported() {
        let state = State {
            dispensing: DispensingState::Dispensing,
            ..State::with_level(0)
        };
        assert_eq!(
            check_invariants(&state, &Settings::default()),
            Err("emptyImpliesIdle")
        );
    }

    #[test]
    fn stale_alert_above_threshold_is_reported() {
        let mut state = State::with_level(80);
        state.notification.low_water_alerted = true;
        assert_eq!(
            check_invariants(&state, &Settings::default()),
            Err("alertClearedAboveThreshold")
        );
    }
}

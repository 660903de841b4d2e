// Pure functions — all dispensing rules live here.
// Each transition takes the current state and returns the next one plus the
// events it raised; the engine only applies results and drives collaborators.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::constants::*;
use crate::types::*;

/// Volume dispensed while the level fell from `start_level` to `end_level`.
pub fn usage_amount(settings: &Settings, start_level: Level, end_level: Level) -> Millilitres {
    let steps = start_level.saturating_sub(end_level) as Millilitres;
    steps.saturating_mul(settings.dispensing_volume)
}

/// Append to the ledger, evicting the oldest entries beyond capacity.
pub fn push_history(history: &mut VecDeque<UsageHistoryItem>, item: UsageHistoryItem) {
    history.push_back(item);
    while history.len() > HISTORY_CAPACITY {
        history.pop_front();
    }
}

/// Record the volume of a run; entries with no volume are dropped.
pub fn record_usage(
    mut state: State,
    settings: &Settings,
    start_level: Level,
    end_level: Level,
    now: DateTime<Utc>,
) -> State {
    let amount = usage_amount(settings, start_level, end_level);
    if amount > 0 {
        push_history(&mut state.history, UsageHistoryItem::dispensed(now, amount));
    }
    state
}

/// Evaluate alert conditions after the level changed.
pub fn watch_threshold(mut state: State, settings: &Settings) -> (State, Vec<DispenserEvent>) {
    let threshold = settings.low_water_threshold;
    let mut events = Vec::new();

    if state.level <= threshold {
        if !state.notification.low_water_alerted {
            events.push(DispenserEvent::LowWater { threshold });
            state.notification.low_water_alerted = true;
        }
    } else {
        state.notification.low_water_alerted = false;
    }

    if state.level == EMPTY_LEVEL {
        events.push(DispenserEvent::Empty);
    }

    (state, events)
}

/// Re-arm the low-water alert when a new threshold sits below the level.
/// Never raises an event.
pub fn rearm_for_threshold(mut state: State, settings: &Settings) -> State {
    if state.level > settings.low_water_threshold {
        state.notification.low_water_alerted = false;
    }
    state
}

pub fn start(state: &State) -> TransitionResult {
    if state.is_dispensing() || state.level == EMPTY_LEVEL {
        return TransitionResult::rejected(state);
    }

    TransitionResult {
        success: true,
        new_state: State {
            dispensing: DispensingState::Dispensing,
            run_start_level: state.level,
            ..state.clone()
        },
        events: Vec::new(),
    }
}

pub fn tick(state: &State, settings: &Settings, now: DateTime<Utc>) -> TransitionResult {
    if !state.is_dispensing() {
        return TransitionResult::rejected(state);
    }

    let mut next = State {
        level: state.level.saturating_sub(1),
        ..state.clone()
    };

    if next.level == EMPTY_LEVEL {
        // Run ends on its own
        next = record_usage(next, settings, state.run_start_level, EMPTY_LEVEL, now);
        next.dispensing = DispensingState::Idle;
    }

    let (new_state, events) = watch_threshold(next, settings);
    TransitionResult {
        success: true,
        new_state,
        events,
    }
}

pub fn stop(state: &State, settings: &Settings, now: DateTime<Utc>) -> TransitionResult {
    if !state.is_dispensing() {
        return TransitionResult::rejected(state);
    }

    let mut next = record_usage(
        state.clone(),
        settings,
        state.run_start_level,
        state.level,
        now,
    );
    next.dispensing = DispensingState::Idle;

    TransitionResult {
        success: true,
        new_state: next,
        events: Vec::new(),
    }
}

pub fn refill(state: &State, settings: &Settings, now: DateTime<Utc>) -> TransitionResult {
    if state.is_dispensing() {
        return TransitionResult::rejected(state);
    }

    let mut next = State {
        level: FULL_LEVEL,
        run_start_level: FULL_LEVEL,
        ..state.clone()
    };
    next.notification.low_water_alerted = false;
    push_history(&mut next.history, UsageHistoryItem::refill(now));

    let (new_state, watch_events) = watch_threshold(next, settings);
    let mut events = vec![DispenserEvent::Refilled];
    events.extend(watch_events);

    TransitionResult {
        success: true,
        new_state,
        events,
    }
}

// Model-Based Testing — deterministic trace replay.
// Given a sequence of TransitionLabels, applies each to the pure logic
// and returns the resulting state sequence for assertions.

use chrono::Utc;

use crate::invariants;
use crate::logic;
use crate::types::*;

/// Apply a single labeled transition to the state.
pub fn apply_transition(
    state: &State,
    settings: &Settings,
    label: TransitionLabel,
) -> TransitionResult {
    let now = Utc::now();
    match label {
        TransitionLabel::NoAction => TransitionResult {
            success: true,
            new_state: state.clone(),
            events: Vec::new(),
        },
        TransitionLabel::Start => logic::start(state),
        TransitionLabel::Tick => logic::tick(state, settings, now),
        TransitionLabel::Stop => logic::stop(state, settings, now),
        TransitionLabel::Refill => logic::refill(state, settings, now),
    }
}

/// One replayed step.
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub label: TransitionLabel,
    pub success: bool,
    pub state: State,
    pub events: Vec<DispenserEvent>,
}

/// Replay a full trace of labeled transitions starting from `init`.
/// Rejected transitions are kept in the trace with `success == false`;
/// panics if any invariant is violated along the way.
pub fn replay_trace(init: State, settings: &Settings, labels: &[TransitionLabel]) -> Vec<TraceStep> {
    let mut trace = Vec::with_capacity(labels.len());
    let mut state = init;

    for (i, label) in labels.iter().enumerate() {
        let result = apply_transition(&state, settings, *label);

        if let Err(violated) = invariants::check_invariants(&result.new_state, settings) {
            panic!(
                "Invariant '{}' violated after step {} ({})\nState:\n{}",
                violated, i, label, result.new_state,
            );
        }

        state = result.new_state;
        trace.push(TraceStep {
            label: *label,
            success: result.success,
            state: state.clone(),
            events: result.events,
        });
    }

    trace
}

/// All events raised over a replayed trace, in order.
pub fn collect_events(trace: &[TraceStep]) -> Vec<DispenserEvent> {
    trace.iter().flat_map(|step| step.events.iter().copied()).collect()
}

// Simulator — randomized exploration of the dispensing state machine.
// Each trace draws settings and an initial level, then keeps picking an
// enabled action at random while checking every invariant.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::*;
use crate::invariants;
use crate::mbt;
use crate::types::*;

const ALL_ACTIONS: &[TransitionLabel] = &[
    TransitionLabel::Start,
    TransitionLabel::Tick,
    TransitionLabel::Stop,
    TransitionLabel::Refill,
];

/// Draw the settings and starting state for one trace.
pub fn init_trace(rng: &mut impl Rng) -> (State, Settings) {
    let settings = Settings {
        low_water_threshold: *THRESHOLDS.choose(rng).unwrap_or(&DEFAULT_LOW_WATER_THRESHOLD),
        dispensing_speed: 1,
        dispensing_volume: rng.gen_range(1..=50),
    };
    let level = *INITIAL_LEVELS.choose(rng).unwrap_or(&FULL_LEVEL);
    (State::with_level(level), settings)
}

/// Execute a single step: shuffle the actions and take the first one enabled.
/// Ticks are weighted so runs actually drain.
pub fn step(state: &State, settings: &Settings, rng: &mut impl Rng) -> mbt::TraceStep {
    let mut actions: Vec<TransitionLabel> = ALL_ACTIONS.to_vec();
    if state.is_dispensing() && rng.gen_bool(0.8) {
        actions.retain(|a| *a == TransitionLabel::Tick);
    }
    actions.shuffle(rng);

    for action in &actions {
        let result = mbt::apply_transition(state, settings, *action);
        if result.success {
            return mbt::TraceStep {
                label: *action,
                success: true,
                state: result.new_state,
                events: result.events,
            };
        }
    }

    mbt::TraceStep {
        label: TransitionLabel::NoAction,
        success: true,
        state: state.clone(),
        events: Vec::new(),
    }
}

/// Result of running one simulation trace.
pub struct TraceResult {
    pub steps: usize,
    pub violation: Option<(&'static str, usize, State)>,
    pub final_state: State,
    pub events: usize,
}

/// Run a single simulation trace for up to `max_steps`.
pub fn run_trace(max_steps: usize, rng: &mut impl Rng, verbose: bool) -> TraceResult {
    let (mut state, settings) = init_trace(rng);
    let mut events = 0;

    if verbose {
        println!(
            "[State 0] init (threshold {}%, {} ml/step)",
            settings.low_water_threshold, settings.dispensing_volume
        );
        println!("{}\n", state);
    }

    if let Err(violated) = invariants::check_invariants(&state, &settings) {
        return TraceResult {
            steps: 0,
            violation: Some((violated, 0, state.clone())),
            final_state: state,
            events,
        };
    }

    for step_num in 1..=max_steps {
        let next = step(&state, &settings, rng);
        events += next.events.len();

        if verbose && next.state != state {
            println!("[State {}] {}", step_num, next.label);
            for event in &next.events {
                println!("  -> {}", event);
            }
            println!("{}\n", next.state);
        }

        state = next.state;

        if let Err(violated) = invariants::check_invariants(&state, &settings) {
            if verbose {
                println!("!!! INVARIANT VIOLATION: {} at step {}", violated, step_num);
            }
            return TraceResult {
                steps: step_num,
                violation: Some((violated, step_num, state.clone())),
                final_state: state,
                events,
            };
        }
    }

    TraceResult {
        steps: max_steps,
        violation: None,
        final_state: state,
        events,
    }
}

/// Run many simulation traces from a single seed.
pub fn run_simulation(
    max_steps: usize,
    max_samples: usize,
    seed: u64,
    verbose: bool,
) -> SimulationResult {
    use rand::SeedableRng;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let start = std::time::Instant::now();
    let mut violation = None;
    let mut events = 0;

    for trace_num in 0..max_samples {
        let result = run_trace(max_steps, &mut rng, verbose && trace_num == 0);
        events += result.events;

        if let Some((inv_name, step, state)) = result.violation {
            violation = Some(ViolationInfo {
                invariant: inv_name,
                trace: trace_num,
                step,
                state,
            });
            break;
        }
    }

    SimulationResult {
        max_steps,
        max_samples,
        seed,
        events,
        elapsed: start.elapsed(),
        violation,
    }
}

pub struct ViolationInfo {
    pub invariant: &'static str,
    pub trace: usize,
    pub step: usize,
    pub state: State,
}

pub struct SimulationResult {
    pub max_steps: usize,
    pub max_samples: usize,
    pub seed: u64,
    pub events: usize,
    pub elapsed: std::time::Duration,
    pub violation: Option<ViolationInfo>,
}

impl std::fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let traces_per_sec = self.max_samples as f64 / self.elapsed.as_secs_f64().max(1e-9);
        writeln!(f)?;
        match &self.violation {
            None => {
                writeln!(
                    f,
                    "[ok] No violation found ({:.0}ms at {:.0} traces/second).",
                    self.elapsed.as_millis(),
                    traces_per_sec,
                )?;
                writeln!(
                    f,
                    "Checked {} traces of {} steps each ({} events raised).",
                    self.max_samples, self.max_steps, self.events,
                )?;
            }
            Some(v) => {
                writeln!(
                    f,
                    "[VIOLATION] Invariant '{}' violated at trace {} step {}.",
                    v.invariant, v.trace, v.step,
                )?;
                writeln!(f, "State at violation:")?;
                writeln!(f, "{}", v.state)?;
            }
        }
        writeln!(f, "Seed: {} ", self.seed)
    }
}

// Engine tests — drive the stateful dispenser through a manual scheduler and
// check what reaches the notifier and the ledger.

use water_dispenser_sim::engine::Dispenser;
use water_dispenser_sim::notifier::RecordingNotifier;
use water_dispenser_sim::scheduler::ManualScheduler;
use water_dispenser_sim::settings::{load_settings, MemoryStore};
use water_dispenser_sim::types::*;
use water_dispenser_sim::DispenserError;

type TestDispenser = Dispenser<ManualScheduler, RecordingNotifier>;

fn dispenser_at(level: Level) -> (TestDispenser, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    let dispenser = Dispenser::with_state(
        State::with_level(level),
        Settings {
            dispensing_speed: 1,
            ..Settings::default()
        },
        ManualScheduler::new(),
        notifier.clone(),
    );
    (dispenser, notifier)
}

/// Fire the active timer `n` times; stops early once no timer is active.
fn fire(dispenser: &mut TestDispenser, n: usize) {
    for _ in 0..n {
        match dispenser.timer() {
            Some(handle) => {
                dispenser.on_timer(handle);
            }
            None => break,
        }
    }
}

#[test]
fn depletion_fires_empty_once_and_records_run() {
    let (mut d, notifier) = dispenser_at(3);

    assert!(d.start());
    fire(&mut d, 3);

    assert_eq!(d.level(), 0);
    assert_eq!(d.dispensing_state(), DispensingState::Idle);
    assert!(d.timer().is_none());
    assert!(d.scheduler().active().is_empty());
    assert_eq!(d.history().len(), 1);
    assert_eq!(d.history()[0].amount, 30);

    let empties = notifier
        .titles()
        .iter()
        .filter(|t| *t == "Water Dispenser Empty")
        .count();
    assert_eq!(empties, 1);
}

#[test]
fn stop_mid_run_cancels_timer() {
    let (mut d, _) = dispenser_at(50);

    d.start();
    let handle = d.timer().unwrap();
    fire(&mut d, 3);
    assert!(d.stop());

    assert_eq!(d.level(), 47);
    assert_eq!(d.dispensing_state(), DispensingState::Idle);
    assert_eq!(d.history()[0].amount, 30);
    assert!(!d.scheduler().is_active(handle));

    // A firing that was already in flight is dropped
    assert!(!d.on_timer(handle));
    assert_eq!(d.level(), 47);
}

#[test]
fn stop_when_idle_is_a_no_op() {
    let (mut d, notifier) = dispenser_at(70);
    let before = d.state().clone();

    assert!(!d.stop());
    assert_eq!(d.state(), &before);
    assert!(d.history().is_empty());
    assert!(notifier.delivered().is_empty());
}

#[test]
fn redundant_start_keeps_single_timer() {
    let (mut d, _) = dispenser_at(70);

    assert!(d.start());
    let first = d.timer();
    assert!(!d.start());
    assert!(!d.start());

    assert_eq!(d.timer(), first);
    assert_eq!(d.scheduler().scheduled_total(), 1);
    assert_eq!(d.scheduler().active().len(), 1);
}

#[test]
fn start_on_empty_is_refused() {
    let (mut d, _) = dispenser_at(0);
    assert!(!d.start());
    assert!(d.timer().is_none());
    assert_eq!(d.dispensing_state(), DispensingState::Idle);
}

#[test]
fn refill_from_any_idle_level() {
    for level in [0, 1, 19, 20, 64, 100] {
        let (mut d, _) = dispenser_at(level);
        assert!(d.refill());
        assert_eq!(d.level(), 100);
        assert!(d.history().back().unwrap().is_refill());
    }
}

#[test]
fn refill_refused_while_dispensing() {
    let (mut d, notifier) = dispenser_at(60);
    d.start();
    fire(&mut d, 2);
    let before = d.state().clone();

    assert!(!d.refill());
    assert_eq!(d.state(), &before);
    assert_eq!(d.level(), 58);
    assert_eq!(d.dispensing_state(), DispensingState::Dispensing);
    assert!(notifier.delivered().is_empty());
}

#[test]
fn low_water_rearms_after_refill() {
    let (mut d, notifier) = dispenser_at(25);

    d.start();
    fire(&mut d, 10);
    assert_eq!(d.level(), 15);
    assert_eq!(
        notifier.delivered().last().map(|n| n.body.clone()),
        Some("Water dispenser is below 20%! Please refill soon.".to_string())
    );

    d.stop();
    d.refill();
    d.start();
    fire(&mut d, 85);
    assert_eq!(d.level(), 15);

    assert_eq!(
        notifier.titles(),
        vec![
            "Low Water Level".to_string(),
            "Water Refilled".to_string(),
            "Low Water Level".to_string(),
        ]
    );
}

#[test]
fn history_keeps_five_most_recent() {
    let (mut d, _) = dispenser_at(100);

    for run in 1..=6 {
        d.start();
        fire(&mut d, run);
        d.stop();
    }
    d.refill();

    let history = d.history();
    assert_eq!(history.len(), 5);
    let amounts: Vec<_> = history.iter().map(|item| item.amount).collect();
    assert_eq!(amounts, vec![30, 40, 50, 60, 0]);
    assert!(history[4].is_refill());
    assert!(history
        .iter()
        .zip(history.iter().skip(1))
        .all(|(a, b)| a.timestamp <= b.timestamp));
}

#[test]
fn configured_volume_scales_usage() {
    let (mut d, _) = dispenser_at(80);
    d.apply_settings(Settings {
        dispensing_volume: 25,
        dispensing_speed: 1,
        ..Settings::default()
    })
    .unwrap();

    d.start();
    fire(&mut d, 4);
    d.stop();
    assert_eq!(d.history()[0].amount, 100);
}

#[test]
fn dispatch_failure_is_sticky_until_cleared() {
    let (mut d, notifier) = dispenser_at(22);
    notifier.set_failing(true);

    d.start();
    fire(&mut d, 2); // low-water attempted and fails
    assert!(d
        .notification_error()
        .unwrap()
        .starts_with("notification dispatch failed"));

    // Dispensing carries on regardless
    notifier.set_failing(false);
    fire(&mut d, 20);
    assert_eq!(d.level(), 0);
    assert_eq!(d.history()[0].amount, 220);
    // Empty was suppressed by the sticky error
    assert!(notifier.delivered().is_empty());

    d.clear_notification_error();
    d.refill();
    assert_eq!(notifier.titles(), vec!["Water Refilled".to_string()]);
}

#[test]
fn permission_denial_suppresses_notifications() {
    let notifier = RecordingNotifier::denying();
    let mut d = Dispenser::new(Settings::default(), ManualScheduler::new(), notifier.clone());

    assert!(!d.request_notification_permission());
    assert_eq!(
        d.notification_error(),
        Some(DispenserError::NotificationPermissionDenied.to_string().as_str())
    );

    d.refill();
    assert_eq!(d.level(), 100);
    assert!(notifier.delivered().is_empty());
}

#[test]
fn saved_settings_apply_and_persist() {
    let (mut d, _) = dispenser_at(100);
    let mut store = MemoryStore::new();
    let wanted = Settings {
        low_water_threshold: 90,
        dispensing_speed: 10,
        dispensing_volume: 5,
    };

    d.save_settings(&mut store, wanted).unwrap();
    assert_eq!(d.settings(), &wanted);
    assert_eq!(load_settings(&store), wanted);

    d.start();
    fire(&mut d, 10);
    d.stop();
    assert_eq!(d.history()[0].amount, 50);
}

// Engine — the stateful dispenser.
// Applies the pure transitions from `logic` and performs their side effects:
// owns at most one repeating timer and forwards raised events to the notifier.
// Collaborator failures are recorded in the notification state and never
// interrupt dispensing.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::DispenserError;
use crate::logic;
use crate::notifier::{Notification, Notifier};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::settings::{self, SettingsStore};
use crate::types::*;

pub struct Dispenser<S, N> {
    state: State,
    settings: Settings,
    timer: Option<TimerHandle>,
    scheduler: S,
    notifier: N,
}

impl<S: Scheduler, N: Notifier> Dispenser<S, N> {
    /// A full, idle dispenser.
    pub fn new(settings: Settings, scheduler: S, notifier: N) -> Self {
        Self::with_state(State::default(), settings, scheduler, notifier)
    }

    /// Resume from an existing state. A running state is brought back to idle
    /// since no timer exists for it yet.
    pub fn with_state(mut state: State, settings: Settings, scheduler: S, notifier: N) -> Self {
        state.dispensing = DispensingState::Idle;
        Self {
            state,
            settings,
            timer: None,
            scheduler,
            notifier,
        }
    }

    /// Ask for notification permission. A refusal is kept as the sticky error.
    pub fn request_notification_permission(&mut self) -> bool {
        match self.notifier.request_permission() {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "notifications disabled");
                self.state.notification.last_error = Some(error.to_string());
                false
            }
        }
    }

    pub fn start(&mut self) -> bool {
        if self.timer.is_some() {
            debug!("start ignored: already dispensing");
            return false;
        }

        let result = logic::start(&self.state);
        if !result.success {
            debug!(level = self.state.level, "start ignored");
            return false;
        }

        self.state = result.new_state;
        let handle = self
            .scheduler
            .schedule_repeating(self.settings.tick_interval());
        self.timer = Some(handle);
        debug!(%handle, level = self.state.level, "dispensing started");
        true
    }

    /// Deliver one firing of a timer. Firings from anything but the active
    /// timer are dropped.
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        if self.timer != Some(handle) {
            debug!(%handle, "stale tick dropped");
            return false;
        }

        let result = logic::tick(&self.state, &self.settings, Utc::now());
        if !result.success {
            return false;
        }

        self.state = result.new_state;
        if !self.state.is_dispensing() {
            self.cancel_timer();
            debug!("dispenser ran dry");
        }
        self.dispatch(result.events);
        true
    }

    pub fn stop(&mut self) -> bool {
        let result = logic::stop(&self.state, &self.settings, Utc::now());
        if !result.success {
            debug!("stop ignored: idle");
            return false;
        }

        self.cancel_timer();
        self.state = result.new_state;
        debug!(level = self.state.level, "dispensing stopped");
        self.dispatch(result.events);
        true
    }

    pub fn refill(&mut self) -> bool {
        let result = logic::refill(&self.state, &self.settings, Utc::now());
        if !result.success {
            debug!("refill ignored: dispensing");
            return false;
        }

        self.state = result.new_state;
        self.dispatch(result.events);
        true
    }

    /// Replace the live settings. A running timer is rescheduled at the new speed.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<(), DispenserError> {
        settings.validate()?;

        let speed_changed = settings.dispensing_speed != self.settings.dispensing_speed;
        self.settings = settings;
        self.state =
            logic::rearm_for_threshold(std::mem::take(&mut self.state), &self.settings);

        if speed_changed {
            if let Some(old) = self.timer.take() {
                self.scheduler.cancel(old);
                let handle = self
                    .scheduler
                    .schedule_repeating(self.settings.tick_interval());
                self.timer = Some(handle);
                debug!(%old, %handle, "timer rescheduled");
            }
        }
        Ok(())
    }

    /// Persist `settings`, then apply them. Live settings stay untouched if
    /// the store refuses the write.
    pub fn save_settings(
        &mut self,
        store: &mut impl SettingsStore,
        settings: Settings,
    ) -> Result<(), DispenserError> {
        settings::save_settings(store, &settings)?;
        self.apply_settings(settings)?;
        info!(?settings, "settings saved");
        Ok(())
    }

    pub fn clear_notification_error(&mut self) {
        self.state.notification.last_error = None;
    }

    pub fn level(&self) -> Level {
        self.state.level
    }

    pub fn dispensing_state(&self) -> DispensingState {
        self.state.dispensing
    }

    /// Oldest first.
    pub fn history(&self) -> &VecDeque<UsageHistoryItem> {
        &self.state.history
    }

    pub fn notification_error(&self) -> Option<&str> {
        self.state.notification.last_error.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn timer(&self) -> Option<TimerHandle> {
        self.timer
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            level: self.state.level,
            dispensing: self.state.dispensing,
            history: self.state.history.iter().cloned().collect(),
            notification_error: self.state.notification.last_error.clone(),
            settings: self.settings,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn dispatch(&mut self, events: Vec<DispenserEvent>) {
        for event in events {
            debug!(%event, level = self.state.level, "event raised");

            if let Some(error) = &self.state.notification.last_error {
                debug!(%event, %error, "notification suppressed");
                continue;
            }

            let notification = Notification::for_event(&event);
            match self.notifier.deliver(&notification) {
                Ok(()) => info!(%event, "notification sent"),
                Err(error) => {
                    warn!(%event, %error, "notification failed");
                    self.state.notification.last_error = Some(error.to_string());
                }
            }
        }
    }
}

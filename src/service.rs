// Service — async host for a `Dispenser`.
// One tokio task owns the engine and serializes everything that touches it:
// commands arrive over a bounded channel, timer firings over an unbounded one.
// Each repeating timer is its own task feeding that channel; cancelling a timer
// aborts the task. Firings already queued for a cancelled timer are dropped by
// the engine's handle check.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use crate::engine::Dispenser;
use crate::error::DispenserError;
use crate::notifier::Notifier;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::settings::{self, SettingsStore};
use crate::types::{Settings, Snapshot, State};

const COMMAND_BUFFER: usize = 64;

/// Scheduler backed by tokio interval tasks.
pub struct TokioScheduler {
    next_id: u64,
    ticks: mpsc::UnboundedSender<TimerHandle>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(ticks: mpsc::UnboundedSender<TimerHandle>) -> Self {
        Self {
            next_id: 0,
            ticks,
            tasks: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&mut self, interval: Duration) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let ticks = self.ticks.clone();
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            // First firing one full period after scheduling
            let mut timer = interval_at(Instant::now() + period, period);
            loop {
                timer.tick().await;
                if ticks.send(handle).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

enum Command {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<bool>),
    Refill(oneshot::Sender<bool>),
    SaveSettings(Settings, oneshot::Sender<Result<(), DispenserError>>),
    ClearNotificationError,
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Cloneable handle to a running dispenser service.
#[derive(Clone)]
pub struct DispenserHandle {
    commands: mpsc::Sender<Command>,
}

impl DispenserHandle {
    pub async fn start(&self) -> Result<bool, DispenserError> {
        self.request(Command::Start).await
    }

    pub async fn stop(&self) -> Result<bool, DispenserError> {
        self.request(Command::Stop).await
    }

    pub async fn refill(&self) -> Result<bool, DispenserError> {
        self.request(Command::Refill).await
    }

    pub async fn save_settings(&self, settings: Settings) -> Result<(), DispenserError> {
        self.request(|reply| Command::SaveSettings(settings, reply))
            .await?
    }

    pub async fn clear_notification_error(&self) -> Result<(), DispenserError> {
        self.commands
            .send(Command::ClearNotificationError)
            .await
            .map_err(|_| DispenserError::ServiceStopped)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, DispenserError> {
        self.request(Command::Snapshot).await
    }

    pub async fn shutdown(&self) -> Result<(), DispenserError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| DispenserError::ServiceStopped)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DispenserError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| DispenserError::ServiceStopped)?;
        response.await.map_err(|_| DispenserError::ServiceStopped)
    }
}

/// Load settings from `store`, build the engine, and run it on a new task.
///
/// Must be called from within a tokio runtime.
pub fn spawn<St, N>(state: State, store: St, notifier: N) -> (DispenserHandle, JoinHandle<()>)
where
    St: SettingsStore + Send + 'static,
    N: Notifier + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (tick_tx, tick_rx) = mpsc::unbounded_channel();

    let settings = settings::load_settings(&store);
    let mut dispenser =
        Dispenser::with_state(state, settings, TokioScheduler::new(tick_tx), notifier);
    dispenser.request_notification_permission();

    let task = tokio::spawn(run(dispenser, store, command_rx, tick_rx));
    (
        DispenserHandle {
            commands: command_tx,
        },
        task,
    )
}

async fn run<St, N>(
    mut dispenser: Dispenser<TokioScheduler, N>,
    mut store: St,
    mut commands: mpsc::Receiver<Command>,
    mut ticks: mpsc::UnboundedReceiver<TimerHandle>,
) where
    St: SettingsStore,
    N: Notifier,
{
    info!(level = dispenser.level(), "dispenser service started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Start(reply) => {
                        let _ = reply.send(dispenser.start());
                    }
                    Command::Stop(reply) => {
                        let _ = reply.send(dispenser.stop());
                    }
                    Command::Refill(reply) => {
                        let _ = reply.send(dispenser.refill());
                    }
                    Command::SaveSettings(settings, reply) => {
                        let _ = reply.send(dispenser.save_settings(&mut store, settings));
                    }
                    Command::ClearNotificationError => dispenser.clear_notification_error(),
                    Command::Snapshot(reply) => {
                        let _ = reply.send(dispenser.snapshot());
                    }
                    Command::Shutdown => break,
                }
            }
            Some(handle) = ticks.recv() => {
                dispenser.on_timer(handle);
            }
        }
    }

    dispenser.stop();
    debug!(level = dispenser.level(), "dispenser service stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::settings::MemoryStore;
    use crate::types::DispensingState;

    fn fast_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        settings::save_settings(
            &mut store,
            &Settings {
                dispensing_speed: 1,
                ..Settings::default()
            },
        )
        .unwrap();
        store
    }

    async fn wait_until_idle(handle: &DispenserHandle) -> Snapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = handle.snapshot().await.expect("snapshot");
            if snapshot.dispensing == DispensingState::Idle || Instant::now() > deadline {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn service_drains_to_empty() {
        let notifier = RecordingNotifier::new();
        let (handle, task) = spawn(State::with_level(3), fast_store(), notifier.clone());

        assert!(handle.start().await.unwrap());
        let snapshot = wait_until_idle(&handle).await;

        assert_eq!(snapshot.level, 0);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].amount, 30);
        assert_eq!(
            notifier.titles(),
            vec!["Low Water Level".to_string(), "Water Dispenser Empty".to_string()]
        );

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_freezes_level() {
        let (handle, task) = spawn(State::default(), fast_store(), RecordingNotifier::new());

        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.stop().await.unwrap());

        let stopped = handle.snapshot().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let later = handle.snapshot().await.unwrap();

        assert_eq!(stopped.dispensing, DispensingState::Idle);
        assert_eq!(stopped.level, later.level);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn settings_saved_through_service() {
        let (handle, task) =
            spawn(State::default(), MemoryStore::new(), RecordingNotifier::new());
        let wanted = Settings {
            low_water_threshold: 45,
            ..Settings::default()
        };

        handle.save_settings(wanted).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().settings, wanted);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(handle.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn denied_permission_is_visible() {
        let (handle, task) = spawn(
            State::with_level(50),
            MemoryStore::new(),
            RecordingNotifier::denying(),
        );
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(
            snapshot.notification_error.as_deref(),
            Some("notification permission denied")
        );

        handle.clear_notification_error().await.unwrap();
        assert!(handle.refill().await.unwrap());
        assert_eq!(handle.snapshot().await.unwrap().notification_error, None);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}

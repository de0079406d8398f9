use super::client::RobotClient;
use super::models::{Command, RobotState};
use super::state::TelemetryCache;
use crate::config::Config;
use crate::error::SubmitError;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Dispatcher mode. `Reading` refreshes telemetry, `Writing` executes one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Reading = 1,
    Writing = 2,
}

impl From<u8> for Phase {
    fn from(v: u8) -> Self {
        match v {
            1 => Phase::Reading,
            2 => Phase::Writing,
            _ => Phase::Idle,
        }
    }
}

/// Shared view of the dispatcher phase. Only the dispatcher writes it.
#[derive(Debug, Clone)]
pub struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    fn new(phase: Phase) -> Self {
        Self(Arc::new(AtomicU8::new(phase as u8)))
    }

    pub fn get(&self) -> Phase {
        Phase::from(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: Phase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub poll_interval: Duration,
    pub goto_robot_index: usize,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            goto_robot_index: config.goto_robot_index,
        }
    }
}

/// Producer side of the single-slot command handoff.
///
/// A command can only be submitted once the previous one has been taken by
/// the dispatcher; otherwise it is handed back in [`SubmitError::Pending`].
#[derive(Debug)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    pub fn submit(&self, command: Command) -> Result<(), SubmitError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(cmd) => SubmitError::Pending(cmd),
            TrySendError::Closed(cmd) => SubmitError::Stopped(cmd),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of one phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Quit,
}

/// Alternates telemetry refresh and command execution for one fleet.
pub struct CommandDispatcher {
    client: Arc<RobotClient>,
    cache: TelemetryCache,
    settings: DispatcherSettings,
    commands: mpsc::Receiver<Command>,
    senders_closed: bool,
    pending: Option<Command>,
    phase: PhaseCell,
}

impl CommandDispatcher {
    pub fn new(
        client: Arc<RobotClient>,
        cache: TelemetryCache,
        settings: DispatcherSettings,
    ) -> (Self, CommandSender) {
        let (tx, rx) = mpsc::channel(1);
        let dispatcher = Self {
            client,
            cache,
            settings,
            commands: rx,
            senders_closed: false,
            pending: None,
            phase: PhaseCell::new(Phase::Reading),
        };
        (dispatcher, CommandSender { tx })
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Perform exactly one phase transition.
    ///
    /// `Reading` → refresh, then `Writing` if a command is waiting (else stay).
    /// `Writing` → execute the taken command, then `Idle`.
    /// `Idle` → `Reading`.
    pub async fn step(&mut self) -> Step {
        match self.phase.get() {
            Phase::Reading => {
                self.refresh().await;
                match self.commands.try_recv() {
                    Ok(cmd) => self.take(cmd),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => self.senders_closed = true,
                }
                Step::Continue
            }
            Phase::Writing => {
                let step = match self.pending.take() {
                    Some(cmd) => self.execute(cmd).await,
                    None => Step::Continue,
                };
                self.phase.set(Phase::Idle);
                step
            }
            Phase::Idle => {
                self.phase.set(Phase::Reading);
                Step::Continue
            }
        }
    }

    /// Spawn the dispatch loop on the tokio runtime.
    pub fn start(self) -> DispatcherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);
        let phase = self.phase.clone();
        let join = tokio::spawn(async move {
            self.run(stop_rx).await;
            let _ = exited_tx.send(true);
        });
        DispatcherHandle {
            stop: stop_tx,
            exited: exited_rx,
            join,
            phase,
        }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            robots = self.cache.len(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Command dispatcher started"
        );

        loop {
            let stop_requested = *stop.borrow();
            if stop_requested {
                break;
            }

            let before = self.phase.get();
            if self.step().await == Step::Quit {
                break;
            }

            // Nothing to write: wait out the poll interval, unless a command
            // or a stop request arrives first.
            if before == Phase::Reading && self.phase.get() == Phase::Reading {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    cmd = self.commands.recv(), if !self.senders_closed => match cmd {
                        Some(cmd) => self.take(cmd),
                        None => self.senders_closed = true,
                    },
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        self.phase.set(Phase::Idle);
        info!("Command dispatcher stopped");
    }

    fn take(&mut self, cmd: Command) {
        self.pending = Some(cmd);
        self.phase.set(Phase::Writing);
    }

    async fn refresh(&self) {
        for (index, result) in self.client.refresh_telemetry(None).await {
            match result {
                Ok(telemetry) => {
                    self.cache.update(index, telemetry);
                }
                Err(e) => warn!(
                    robot = index,
                    error = %e,
                    retriable = e.is_retriable(),
                    "Telemetry refresh failed, keeping last known values"
                ),
            }
        }
        self.cache.publish();
    }

    async fn execute(&self, cmd: Command) -> Step {
        info!(command = cmd.token(), "Executing command");
        match cmd {
            Command::Data => self.cache.publish(),
            Command::Pause => self.set_all(RobotState::Paused).await,
            Command::Ready => self.set_all(RobotState::Ready).await,
            Command::GoTo(pose) => {
                let index = self.settings.goto_robot_index;
                if let Err(e) = self.client.relocate_mission(index, pose).await {
                    error!(
                        robot = index,
                        error = %e,
                        "go_to failed; robot requires an explicit ready once resolved"
                    );
                }
            }
            Command::Idle => {}
            Command::Quit => {
                info!("Quit command received");
                return Step::Quit;
            }
            Command::Invalid(raw) => warn!(command = %raw, "Invalid command ignored"),
        }
        Step::Continue
    }

    async fn set_all(&self, state: RobotState) {
        for (index, result) in self.client.set_state_all(state).await {
            if let Err(e) = result {
                error!(robot = index, state = ?state, error = %e, "State change failed");
            }
        }
    }
}

/// Control over a running dispatcher.
pub struct DispatcherHandle {
    stop: watch::Sender<bool>,
    exited: watch::Receiver<bool>,
    join: JoinHandle<()>,
    phase: PhaseCell,
}

impl DispatcherHandle {
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Flips to `true` once the loop has exited.
    pub fn exited(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }

    /// Request a stop and wait for the loop to exit. The request is observed
    /// between phases, never in the middle of a relocation.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        self.wait().await;
    }

    /// Wait for the loop to exit on its own (after `quit`).
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, "Command dispatcher task failed");
        }
    }
}

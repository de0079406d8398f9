//! Polling adapters for automation protocols (PLC tag maps, OPC-UA nodes).
//!
//! A bridge exposes a command tag and a set of telemetry tags. [`run_bridge`]
//! reads the command tag every cycle, hands new commands to the dispatcher
//! and writes the cached telemetry back. Protocol failures are logged and the
//! pump keeps going; they never reach the dispatcher.
//!
//! This crate ships the pump only. Concrete [`ProtocolBridge`] implementations
//! (an OPC-UA server, a PLC driver) live in the binaries that link a protocol
//! stack and drive them with [`run_bridge`] next to the HTTP adapter.

use crate::error::{BridgeError, SubmitError};
use crate::robot::dispatcher::CommandSender;
use crate::robot::models::{Command, TelemetryView};
use crate::robot::state::TelemetryCache;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[async_trait]
pub trait ProtocolBridge: Send {
    /// Current value of the command tag, `None` when unset.
    async fn read_command(&mut self) -> Result<Option<Command>, BridgeError>;

    async fn write_telemetry(&mut self, telemetry: &[TelemetryView]) -> Result<(), BridgeError>;

    /// Connectivity flag shown to the automation side.
    async fn set_connected(&mut self, connected: bool) -> Result<(), BridgeError>;
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub cycle: Duration,
    pub stale_after: chrono::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    Running,
    /// `quit` was handed to the dispatcher.
    Quit,
    DispatcherStopped,
}

/// Per-bridge pump state.
///
/// Commands are edge-triggered: a tag that keeps reading `go_to` submits once,
/// and again only after it changed in between.
#[derive(Debug, Default)]
pub struct BridgePump {
    last_seen: Option<Command>,
    held: Option<Command>,
}

impl BridgePump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command read from the tag but not yet accepted by the dispatcher.
    pub fn held(&self) -> Option<&Command> {
        self.held.as_ref()
    }

    pub async fn cycle<B: ProtocolBridge + ?Sized>(
        &mut self,
        bridge: &mut B,
        commands: &CommandSender,
        cache: &TelemetryCache,
        stale_after: chrono::Duration,
    ) -> PumpStatus {
        if self.held.is_none() {
            match bridge.read_command().await {
                Ok(Some(cmd)) => {
                    if self.last_seen.as_ref() != Some(&cmd) {
                        self.last_seen = Some(cmd.clone());
                        if cmd != Command::Idle {
                            self.held = Some(cmd);
                        }
                    }
                }
                Ok(None) => self.last_seen = None,
                Err(e) => warn!(error = %e, "Bridge command read failed"),
            }
        }

        let mut status = PumpStatus::Running;
        if let Some(cmd) = self.held.take() {
            let is_quit = cmd == Command::Quit;
            match commands.submit(cmd) {
                Ok(()) if is_quit => status = PumpStatus::Quit,
                Ok(()) => {}
                Err(SubmitError::Pending(cmd)) => {
                    debug!(command = cmd.token(), "Dispatcher busy, holding command");
                    self.held = Some(cmd);
                }
                Err(SubmitError::Stopped(cmd)) => {
                    warn!(command = cmd.token(), "Dispatcher stopped, dropping command");
                    status = PumpStatus::DispatcherStopped;
                }
            }
        }

        if let Err(e) = bridge.write_telemetry(&cache.views(stale_after)).await {
            warn!(error = %e, "Bridge telemetry write failed");
        }

        status
    }
}

/// Run `bridge` until `quit` is handed off, the dispatcher goes away or `stop` fires.
pub async fn run_bridge<B: ProtocolBridge + ?Sized>(
    bridge: &mut B,
    commands: &CommandSender,
    cache: &TelemetryCache,
    settings: &BridgeSettings,
    mut stop: watch::Receiver<bool>,
) {
    if let Err(e) = bridge.set_connected(true).await {
        warn!(error = %e, "Failed to publish connected flag");
    }
    info!(cycle_ms = settings.cycle.as_millis() as u64, "Protocol bridge started");

    let mut pump = BridgePump::new();
    loop {
        let stop_requested = *stop.borrow();
        if stop_requested {
            break;
        }
        if pump.cycle(bridge, commands, cache, settings.stale_after).await != PumpStatus::Running {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(settings.cycle) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = bridge.set_connected(false).await {
        warn!(error = %e, "Failed to publish disconnected flag");
    }
    info!("Protocol bridge stopped");
}

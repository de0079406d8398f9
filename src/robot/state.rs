use super::models::{FleetMember, RobotTelemetry, TelemetryView};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Telemetry as of the last successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEntry {
    pub telemetry: RobotTelemetry,
    pub updated_at: DateTime<Utc>,
}

/// Last-known telemetry per robot index.
///
/// One writer (the dispatcher), any number of readers. Reads never block.
/// Entries are replaced on success and left alone on failure, so a reader
/// may see stale data; `updated_at` says how stale.
#[derive(Clone)]
pub struct TelemetryCache {
    inner: Arc<Inner>,
}

struct Inner {
    members: Vec<FleetMember>,
    slots: Vec<ArcSwapOption<TelemetryEntry>>,
    generation: watch::Sender<u64>,
}

impl TelemetryCache {
    pub fn new(members: &[FleetMember]) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                members: members.to_vec(),
                slots: members.iter().map(|_| ArcSwapOption::empty()).collect(),
                generation,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    pub fn members(&self) -> &[FleetMember] {
        &self.inner.members
    }

    /// Store fresh telemetry for `index`. Returns false for an unknown index.
    pub fn update(&self, index: usize, telemetry: RobotTelemetry) -> bool {
        self.store(
            index,
            TelemetryEntry {
                telemetry,
                updated_at: Utc::now(),
            },
        )
    }

    pub fn store(&self, index: usize, entry: TelemetryEntry) -> bool {
        match self.inner.slots.get(index) {
            Some(slot) => {
                slot.store(Some(Arc::new(entry)));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<Arc<TelemetryEntry>> {
        self.inner.slots.get(index)?.load_full()
    }

    pub fn snapshot(&self) -> Vec<Option<Arc<TelemetryEntry>>> {
        self.inner.slots.iter().map(|s| s.load_full()).collect()
    }

    /// Signal readers that a new snapshot is available.
    pub fn publish(&self) {
        self.inner.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    /// Display form for adapters: pose rounded to 3 decimals, cached values untouched.
    ///
    /// A robot that was never polled has no pose; one whose last poll is older
    /// than `stale_after` keeps its last pose but reports `connected = false`.
    pub fn views(&self, stale_after: chrono::Duration) -> Vec<TelemetryView> {
        let now = Utc::now();
        self.inner
            .members
            .iter()
            .zip(self.inner.slots.iter())
            .map(|(member, slot)| {
                let entry = slot.load_full();
                let pose = entry.as_ref().map(|e| e.telemetry.position.rounded());
                TelemetryView {
                    index: member.index,
                    robot_id: member.id,
                    x: pose.map(|p| p.x),
                    y: pose.map(|p| p.y),
                    orientation: pose.map(|p| p.orientation),
                    battery_level: entry.as_ref().and_then(|e| e.telemetry.battery_level),
                    state_id: entry.as_ref().and_then(|e| e.telemetry.state_id),
                    mission_text: entry.as_ref().and_then(|e| e.telemetry.mission_text.clone()),
                    connected: entry
                        .as_ref()
                        .is_some_and(|e| now - e.updated_at < stale_after),
                    updated_at: entry.as_ref().map(|e| e.updated_at),
                }
            })
            .collect()
    }
}

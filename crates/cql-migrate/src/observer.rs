//! Structured migration events
//!
//! The coordinator reports each per-migration decision to a
//! [`MigrationObserver`] instead of writing log text itself.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::definitions::RunOutcome;

/// One per-migration decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEvent {
    pub name: String,
    pub checksum: String,
    pub outcome: RunOutcome,
}

impl MigrationEvent {
    pub fn new(name: &str, checksum: &str, outcome: RunOutcome) -> Self {
        Self {
            name: name.to_string(),
            checksum: checksum.to_string(),
            outcome,
        }
    }

    /// `migration.skipped`, `migration.applied`, `migration.claim_lost` or `migration.conflict`
    pub fn kind(&self) -> &'static str {
        self.outcome.event_name()
    }
}

/// Receiver for migration events, injected into the migrator
pub trait MigrationObserver: Send + Sync {
    fn on_event(&self, event: &MigrationEvent);
}

impl<O: MigrationObserver + ?Sized> MigrationObserver for Arc<O> {
    fn on_event(&self, event: &MigrationEvent) {
        (**self).on_event(event)
    }
}

/// Default observer: forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn on_event(&self, event: &MigrationEvent) {
        match event.outcome {
            RunOutcome::ChecksumConflict => warn!(
                event = event.kind(),
                migration = %event.name,
                checksum = %event.checksum,
                "migration body changed since it was recorded"
            ),
            _ => info!(
                event = event.kind(),
                migration = %event.name,
                checksum = %event.checksum,
                "migration handled"
            ),
        }
    }
}

/// Observer that keeps every event in memory, mostly useful in tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MigrationEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(MigrationEvent::kind).collect()
    }
}

impl MigrationObserver for RecordingObserver {
    fn on_event(&self, event: &MigrationEvent) {
        self.events.lock().push(event.clone());
    }
}

//! Migration Definitions - Core types shared by the ledger, applier and coordinator

use serde::{Deserialize, Serialize};

/// A single named migration step
///
/// `name` must be unique across the migration set and should be human
/// readable. `body` holds one or more statements separated by `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSpec {
    pub name: String,
    pub body: String,
}

impl MigrationSpec {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// What happened to one migration during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Recorded checksum matches the body; nothing was written or executed
    SkippedAlreadyApplied,
    /// This runner claimed the migration and executed every statement
    Applied,
    /// Another runner holds the claim; this runner moved on without executing
    ClaimLostToConcurrentRunner,
    /// Recorded checksum differs from the body and override is disabled
    ChecksumConflict,
}

impl RunOutcome {
    /// Structured event name used when reporting this outcome
    pub fn event_name(&self) -> &'static str {
        match self {
            RunOutcome::SkippedAlreadyApplied => "migration.skipped",
            RunOutcome::Applied => "migration.applied",
            RunOutcome::ClaimLostToConcurrentRunner => "migration.claim_lost",
            RunOutcome::ChecksumConflict => "migration.conflict",
        }
    }
}

/// Result of a completed run, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<(String, RunOutcome)>,
}

impl RunReport {
    pub fn record(&mut self, name: &str, outcome: RunOutcome) {
        self.outcomes.push((name.to_string(), outcome));
    }

    /// Whether the run processed any migration at all
    pub fn ran_any(&self) -> bool {
        !self.outcomes.is_empty()
    }

    pub fn applied_count(&self) -> usize {
        self.count(RunOutcome::Applied)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(RunOutcome::SkippedAlreadyApplied)
    }

    pub fn claim_lost_count(&self) -> usize {
        self.count(RunOutcome::ClaimLostToConcurrentRunner)
    }

    pub fn outcome_of(&self, name: &str) -> Option<RunOutcome> {
        self.outcomes
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, outcome)| *outcome)
    }

    fn count(&self, wanted: RunOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == wanted)
            .count()
    }
}

/// Ledger state of a migration, as seen by a read-only status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// No ledger row yet
    Pending,
    /// Ledger row checksum matches the body
    Applied,
    /// Ledger row exists but was recorded for a different body
    Drifted { recorded: String },
}

//! Migration Coordinator - decides skip, run or conflict for each migration
//!
//! Migrations are handled strictly in input order, one at a time. The first
//! fatal error stops the run; nothing after it is read or written.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::applier::{digest, Applier};
use crate::definitions::{MigrationSpec, MigrationState, RunOutcome, RunReport};
use crate::error::{MigrateError, MigrateResult};
use crate::executor::Executor;
use crate::ledger::Ledger;
use crate::observer::{MigrationEvent, MigrationObserver};

/// Orchestrates one run over an ordered migration list
pub struct Coordinator<'a, E: Executor + ?Sized> {
    executor: &'a E,
    keyspace: &'a str,
    allow_override: bool,
    observer: &'a dyn MigrationObserver,
}

impl<'a, E: Executor + ?Sized> Coordinator<'a, E> {
    pub fn new(
        executor: &'a E,
        keyspace: &'a str,
        allow_override: bool,
        observer: &'a dyn MigrationObserver,
    ) -> Self {
        Self {
            executor,
            keyspace,
            allow_override,
            observer,
        }
    }

    /// Apply `specs` in order, returning what happened to each of them
    pub async fn run(&self, specs: &[MigrationSpec]) -> MigrateResult<RunReport> {
        let mut report = RunReport::default();
        if specs.is_empty() {
            return Ok(report);
        }
        reject_duplicates(specs)?;

        let ledger = Ledger::new(self.executor, self.keyspace);
        ledger
            .ensure_table_exists()
            .await
            .map_err(|e| MigrateError::SetupFailed(Box::new(e)))?;

        let applier = Applier::new(self.executor, &ledger);
        for spec in specs {
            let outcome = self.handle(&ledger, &applier, spec).await?;
            report.record(&spec.name, outcome);
        }

        info!(
            applied = report.applied_count(),
            skipped = report.skipped_count(),
            claim_lost = report.claim_lost_count(),
            "migration run complete"
        );
        Ok(report)
    }

    async fn handle(
        &self,
        ledger: &Ledger<'a, E>,
        applier: &Applier<'_, E>,
        spec: &MigrationSpec,
    ) -> MigrateResult<RunOutcome> {
        debug!(migration = %spec.name, "handling migration");
        let checksum = digest(&spec.body);
        let recorded = ledger
            .checksum(&spec.name)
            .await
            .map_err(|e| MigrateError::MigrationFailed {
                name: spec.name.clone(),
                source: Box::new(e),
            })?;

        let outcome = if recorded.is_empty() {
            info!(migration = %spec.name, "running migration");
            self.apply(applier, spec, &checksum).await?
        } else if recorded == checksum {
            RunOutcome::SkippedAlreadyApplied
        } else if !self.allow_override {
            self.emit(spec, &checksum, RunOutcome::ChecksumConflict);
            return Err(MigrateError::ChecksumMismatch {
                name: spec.name.clone(),
                recorded,
                computed: checksum,
            });
        } else {
            info!(
                migration = %spec.name,
                recorded = %recorded,
                "checksum changed, re-running migration with override"
            );
            self.apply(applier, spec, &checksum).await?
        };

        self.emit(spec, &checksum, outcome);
        Ok(outcome)
    }

    async fn apply(
        &self,
        applier: &Applier<'_, E>,
        spec: &MigrationSpec,
        checksum: &str,
    ) -> MigrateResult<RunOutcome> {
        applier
            .apply(spec, checksum, self.allow_override)
            .await
            .map_err(|e| MigrateError::MigrationFailed {
                name: spec.name.clone(),
                source: Box::new(e),
            })
    }

    /// Classify each migration against the ledger without writing anything
    pub async fn status(&self, specs: &[MigrationSpec]) -> MigrateResult<Vec<(String, MigrationState)>> {
        let ledger = Ledger::new(self.executor, self.keyspace);
        let table_exists = ledger.table_exists().await?;

        let mut states = Vec::with_capacity(specs.len());
        for spec in specs {
            let state = if table_exists {
                let recorded = ledger.checksum(&spec.name).await?;
                if recorded.is_empty() {
                    MigrationState::Pending
                } else if recorded == digest(&spec.body) {
                    MigrationState::Applied
                } else {
                    MigrationState::Drifted { recorded }
                }
            } else {
                MigrationState::Pending
            };
            states.push((spec.name.clone(), state));
        }
        Ok(states)
    }

    fn emit(&self, spec: &MigrationSpec, checksum: &str, outcome: RunOutcome) {
        self.observer
            .on_event(&MigrationEvent::new(&spec.name, checksum, outcome));
    }
}

fn reject_duplicates(specs: &[MigrationSpec]) -> MigrateResult<()> {
    let mut seen = HashSet::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(MigrateError::DuplicateMigration(spec.name.clone()));
        }
    }
    Ok(())
}

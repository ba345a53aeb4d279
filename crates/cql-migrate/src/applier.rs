//! Migration Applier - claims a migration and executes its statements

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::STATEMENT_DELIMITER;
use crate::definitions::{MigrationSpec, RunOutcome};
use crate::error::{MigrateError, MigrateResult};
use crate::executor::Executor;
use crate::ledger::{Claim, Ledger};

/// Lowercase hex SHA-256 of a migration body
///
/// Hashes the exact text, whitespace included, so any edit to a recorded
/// migration is detected as drift.
pub fn digest(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Split a body into trimmed, non-empty statements, preserving order
pub fn split_statements(body: &str) -> Vec<&str> {
    body.split(STATEMENT_DELIMITER)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Applies single migrations against an executor
pub struct Applier<'a, E: Executor + ?Sized> {
    executor: &'a E,
    ledger: &'a Ledger<'a, E>,
}

impl<'a, E: Executor + ?Sized> Applier<'a, E> {
    pub fn new(executor: &'a E, ledger: &'a Ledger<'a, E>) -> Self {
        Self { executor, ledger }
    }

    /// Claim `spec` under `checksum` and run its statements
    ///
    /// Returns [`RunOutcome::ClaimLostToConcurrentRunner`] without executing
    /// anything when another runner holds the claim. On a failing statement
    /// the claim is removed before the error is returned.
    pub async fn apply(
        &self,
        spec: &MigrationSpec,
        checksum: &str,
        override_checksum: bool,
    ) -> MigrateResult<RunOutcome> {
        let claim = self
            .ledger
            .claim(&spec.name, checksum, !override_checksum)
            .await?;

        if claim == Claim::Lost {
            info!(
                migration = %spec.name,
                "not running migration, another runner has already claimed it"
            );
            return Ok(RunOutcome::ClaimLostToConcurrentRunner);
        }

        let statements = split_statements(&spec.body);
        for (index, statement) in statements.iter().enumerate() {
            debug!(migration = %spec.name, statement = *statement, "executing statement");

            if let Err(source) = self.executor.execute(statement, &[]).await {
                warn!(migration = %spec.name, statement = *statement, error = %source, "bad query");
                if index > 0 {
                    warn!(
                        migration = %spec.name,
                        "statements run prior to failure:\n{}",
                        statements[..index].join(";\n")
                    );
                }
                warn!(migration = %spec.name, "removing mark for migration");
                self.ledger.remove(&spec.name).await;

                return Err(MigrateError::MigrationExecutionFailed {
                    name: spec.name.clone(),
                    statement: statement.to_string(),
                    source,
                });
            }
        }

        Ok(RunOutcome::Applied)
    }
}

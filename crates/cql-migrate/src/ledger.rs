//! Ledger Manager - reads and writes the `migrations` table
//!
//! The ledger row for a migration doubles as its claim: it is written before
//! any statement runs, and the conditional insert that writes it is the only
//! synchronization between runners.

use tracing::{debug, warn};

use crate::error::{ExecutorError, MigrateError, MigrateResult};
use crate::executor::{Executor, Value};

/// Checks store metadata for the ledger table in the given keyspace
pub const TABLE_EXISTS_CQL: &str = "SELECT table_name FROM system_schema.tables \
     WHERE keyspace_name = ? AND table_name = 'migrations'";

pub const CREATE_TABLE_CQL: &str =
    "CREATE TABLE IF NOT EXISTS migrations (name text, checksum text, PRIMARY KEY (name))";

pub const SELECT_CHECKSUM_CQL: &str = "SELECT checksum FROM migrations WHERE name = ?";

/// Lightweight transaction: only one concurrent writer sees `[applied] = true`
pub const CLAIM_EXCLUSIVE_CQL: &str =
    "INSERT INTO migrations (name, checksum) VALUES (?, ?) IF NOT EXISTS";

/// Plain write, only issued on the override path where exclusivity is given up
pub const CLAIM_OVERWRITE_CQL: &str = "INSERT INTO migrations (name, checksum) VALUES (?, ?)";

/// Conditional like the claim, so rollbacks stay serialized with concurrent claims
pub const DELETE_CQL: &str = "DELETE FROM migrations WHERE name = ? IF EXISTS";

/// Column carrying the outcome of a conditional write
pub const APPLIED_COLUMN: &str = "[applied]";

/// Result of trying to take the claim on a migration name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Acquired,
    /// Another runner already holds the row for this name
    Lost,
}

/// Ledger access over an executor, scoped to one keyspace
pub struct Ledger<'a, E: Executor + ?Sized> {
    executor: &'a E,
    keyspace: &'a str,
}

impl<'a, E: Executor + ?Sized> Ledger<'a, E> {
    pub fn new(executor: &'a E, keyspace: &'a str) -> Self {
        Self { executor, keyspace }
    }

    /// Whether the ledger table is present in the keyspace metadata
    pub async fn table_exists(&self) -> MigrateResult<bool> {
        let row = self
            .executor
            .query_one(TABLE_EXISTS_CQL, &[Value::from(self.keyspace)])
            .await
            .map_err(|source| unavailable("table existence check", source))?;
        Ok(row.is_some())
    }

    /// Create the ledger table unless it already exists
    ///
    /// Safe to race with another runner doing the same: creation relies on
    /// the store's `IF NOT EXISTS`, not on a lock.
    pub async fn ensure_table_exists(&self) -> MigrateResult<()> {
        if self.table_exists().await? {
            return Ok(());
        }

        debug!(keyspace = self.keyspace, "creating missing migrations table");
        self.executor
            .execute(CREATE_TABLE_CQL, &[])
            .await
            .map_err(|source| unavailable("table creation", source))
    }

    /// Recorded checksum for `name`, or an empty string when no row exists
    pub async fn checksum(&self, name: &str) -> MigrateResult<String> {
        let row = self
            .executor
            .query_one(SELECT_CHECKSUM_CQL, &[Value::from(name)])
            .await
            .map_err(|source| unavailable("checksum read", source))?;

        match row {
            Some(row) => row
                .text("checksum")
                .map(str::to_string)
                .map_err(|source| unavailable("checksum read", source)),
            None => Ok(String::new()),
        }
    }

    /// Write the ledger row for `name`
    ///
    /// With `exclusive` the insert is conditional and the store's applied flag
    /// decides who won. Without it the row is overwritten unconditionally and
    /// the claim is always acquired.
    ///
    /// Executor failures are returned as errors rather than folded into
    /// [`Claim::Lost`], so a dropped connection is never mistaken for a sibling
    /// runner holding the claim.
    pub async fn claim(&self, name: &str, checksum: &str, exclusive: bool) -> MigrateResult<Claim> {
        let params = [Value::from(name), Value::from(checksum)];

        if !exclusive {
            self.executor
                .execute(CLAIM_OVERWRITE_CQL, &params)
                .await
                .map_err(|source| unavailable("claim", source))?;
            return Ok(Claim::Acquired);
        }

        let row = self
            .executor
            .query_one(CLAIM_EXCLUSIVE_CQL, &params)
            .await
            .map_err(|source| unavailable("claim", source))?
            .ok_or_else(|| {
                unavailable(
                    "claim",
                    ExecutorError::UnexpectedResult(
                        "conditional insert returned no result row".to_string(),
                    ),
                )
            })?;

        let applied = row
            .flag(APPLIED_COLUMN)
            .map_err(|source| unavailable("claim", source))?;

        Ok(if applied { Claim::Acquired } else { Claim::Lost })
    }

    /// Delete the ledger row for `name`, undoing a claim
    ///
    /// Best effort: a failure is logged and swallowed. A stuck row shows up
    /// on the next run as a checksum to reconcile, not as a lost run.
    ///
    /// The delete is a lightweight transaction. Mixing plain and conditional
    /// writes on one partition breaks the linearizability the claim relies on.
    pub async fn remove(&self, name: &str) {
        if let Err(e) = self.executor.query_one(DELETE_CQL, &[Value::from(name)]).await {
            warn!(migration = name, error = %e, "could not remove migration mark");
        }
    }
}

fn unavailable(operation: &'static str, source: ExecutorError) -> MigrateError {
    MigrateError::LedgerUnavailable { operation, source }
}

//! Error types for the migration system
//!
//! Two layers: [`ExecutorError`] is what a store adapter reports for a single
//! statement, [`MigrateError`] is what a run reports to its caller.

use thiserror::Error;

/// Result type for executor adapter operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Result type for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Failure reported by an [`Executor`](crate::Executor) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The session could not reach the store (dropped connection, no hosts, timeout)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected or failed the statement
    #[error("Query error: {0}")]
    Query(String),

    /// The store answered, but not with the shape the caller expected
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

impl ExecutorError {
    /// Whether this failure came from the connection layer rather than the statement
    pub fn is_connection(&self) -> bool {
        matches!(self, ExecutorError::Connection(_))
    }
}

/// Migration run errors
///
/// Every variant is fatal to the run that produced it. A lost claim race is
/// not an error and never shows up here.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Migrations ledger unavailable during {operation}: {source}")]
    LedgerUnavailable {
        operation: &'static str,
        #[source]
        source: ExecutorError,
    },

    #[error("Could not set up migrations ledger: {0}")]
    SetupFailed(#[source] Box<MigrateError>),

    #[error(
        "Checksum of migration {name} is different from the last time it was run \
         (recorded {recorded}, computed {computed})"
    )]
    ChecksumMismatch {
        name: String,
        recorded: String,
        computed: String,
    },

    #[error("Migration {name} failed on statement `{statement}`: {source}")]
    MigrationExecutionFailed {
        name: String,
        statement: String,
        #[source]
        source: ExecutorError,
    },

    #[error("Failed handling migration {name}: {source}")]
    MigrationFailed {
        name: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("Duplicate migration name in run: {0}")]
    DuplicateMigration(String),

    #[error("Invalid migrator configuration: {0}")]
    InvalidConfig(String),
}

impl MigrateError {
    /// Name of the migration this error is about, if any
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            MigrateError::ChecksumMismatch { name, .. }
            | MigrateError::MigrationExecutionFailed { name, .. }
            | MigrateError::MigrationFailed { name, .. }
            | MigrateError::DuplicateMigration(name) => Some(name),
            MigrateError::SetupFailed(inner) => inner.migration_name(),
            MigrateError::LedgerUnavailable { .. } | MigrateError::InvalidConfig(_) => None,
        }
    }

    /// The failed statement and its cause, looking through `MigrationFailed` wrapping
    pub fn execution_failure(&self) -> Option<(&str, &ExecutorError)> {
        match self {
            MigrateError::MigrationExecutionFailed {
                statement, source, ..
            } => Some((statement, source)),
            MigrateError::MigrationFailed { source, .. } => source.execution_failure(),
            _ => None,
        }
    }

    /// Whether the run stopped because a recorded checksum no longer matches
    pub fn is_checksum_mismatch(&self) -> bool {
        match self {
            MigrateError::ChecksumMismatch { .. } => true,
            MigrateError::MigrationFailed { source, .. } => source.is_checksum_mismatch(),
            _ => false,
        }
    }
}

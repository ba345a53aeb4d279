//! # cql-migrate
//!
//! Exactly-once schema migrations for Cassandra-style stores.
//!
//! Several instances of an application may start at the same time and try
//! to run the same migration set. Each migration is claimed through a
//! conditional insert into a `migrations` ledger table before any of its
//! statements run, so only one instance executes it. The ledger also keeps a
//! checksum of every migration body, which later runs use to skip work that
//! is already done and to refuse migrations that were edited after the fact.
//!
//! ## Features
//!
//! - **Store agnostic**: the core only needs an [`Executor`] over your session
//! - **Drift detection**: checksum mismatches abort the run unless override is enabled
//! - **Structured events**: per-migration decisions go to a [`MigrationObserver`]
//! - **Memory backend**: an in-process [`MemoryExecutor`] for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use cql_migrate::{MemoryExecutor, MigrationSpec, Migrator, MigratorConfig};
//!
//! # tokio_test::block_on(async {
//! let migrator = Migrator::new(MemoryExecutor::new(), MigratorConfig::new("accounts")).unwrap();
//!
//! let migrations = vec![
//!     MigrationSpec::new("0001_users", "CREATE TABLE users (id uuid PRIMARY KEY, email text);"),
//!     MigrationSpec::new("0002_users_email", "CREATE INDEX ON users (email);"),
//! ];
//!
//! assert!(migrator.run(&migrations).await.unwrap());
//!
//! // A second run finds matching checksums and executes nothing
//! let report = migrator.run_with_report(&migrations).await.unwrap();
//! assert_eq!(report.skipped_count(), 2);
//! # });
//! ```

use std::sync::Arc;

pub mod applier;
pub mod backends;
pub mod config;
pub mod coordinator;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod observer;

pub use applier::{digest, split_statements, Applier};
pub use backends::*;
pub use config::*;
pub use coordinator::Coordinator;
pub use definitions::*;
pub use error::*;
pub use executor::{Executor, Row, Value};
pub use ledger::{Claim, Ledger};
pub use observer::*;

/// Runs migration sets against one keyspace
pub struct Migrator<E: Executor> {
    executor: E,
    config: MigratorConfig,
    observer: Arc<dyn MigrationObserver>,
}

impl<E: Executor> Migrator<E> {
    /// Create a migrator that reports events through `tracing`
    pub fn new(executor: E, config: MigratorConfig) -> MigrateResult<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replace the event observer
    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Apply all given migrations in order
    ///
    /// Returns `false` for an empty list, `true` once every migration was
    /// applied, skipped or left to a concurrent runner.
    pub async fn run(&self, migrations: &[MigrationSpec]) -> MigrateResult<bool> {
        Ok(self.run_with_report(migrations).await?.ran_any())
    }

    /// Apply all given migrations in order and report the outcome of each
    pub async fn run_with_report(&self, migrations: &[MigrationSpec]) -> MigrateResult<RunReport> {
        self.coordinator().run(migrations).await
    }

    /// Compare migrations against the ledger without applying anything
    pub async fn status(
        &self,
        migrations: &[MigrationSpec],
    ) -> MigrateResult<Vec<(String, MigrationState)>> {
        self.coordinator().status(migrations).await
    }

    fn coordinator(&self) -> Coordinator<'_, E> {
        Coordinator::new(
            &self.executor,
            &self.config.keyspace,
            self.config.allow_override,
            self.observer.as_ref(),
        )
    }
}

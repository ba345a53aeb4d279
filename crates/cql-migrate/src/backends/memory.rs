//! In-memory executor with linearizable ledger semantics
//!
//! Understands the ledger statements issued by [`Ledger`](crate::Ledger) and
//! records every other statement in execution order. Failure injection and a
//! claim barrier make it possible to drive the failure and race paths without
//! a cluster.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Barrier;

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{Executor, Row, Value};
use crate::ledger::{
    APPLIED_COLUMN, CLAIM_EXCLUSIVE_CQL, CLAIM_OVERWRITE_CQL, CREATE_TABLE_CQL, DELETE_CQL,
    SELECT_CHECKSUM_CQL, TABLE_EXISTS_CQL,
};

#[derive(Debug, Default)]
struct State {
    table_created: bool,
    rows: BTreeMap<String, String>,
    executed: Vec<String>,
    statement_failures: HashMap<String, ExecutorError>,
    ledger_failure: Option<ExecutorError>,
    claim_failure: Option<ExecutorError>,
    create_failure: Option<ExecutorError>,
    delete_failure: Option<ExecutorError>,
    checksum_read_failures: HashMap<String, ExecutorError>,
    table_creations: usize,
    claim_attempts: usize,
}

/// In-memory stand-in for a store session
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    state: Mutex<State>,
    keyspace: Option<String>,
    claim_barrier: Option<Arc<Barrier>>,
}

impl MemoryExecutor {
    /// Create an empty store that answers metadata queries for any keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose ledger table lives in `keyspace` only
    pub fn for_keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: Some(keyspace.into()),
            ..Self::default()
        }
    }

    /// Park every conditional insert on `barrier` before it is evaluated
    ///
    /// Sharing one barrier between runners makes their claims race on the
    /// same ledger state.
    pub fn with_claim_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.claim_barrier = Some(barrier);
        self
    }

    /// Fail every execution of `statement` (matched after trimming) with `error`
    pub fn fail_statement(&self, statement: &str, error: ExecutorError) {
        self.state
            .lock()
            .statement_failures
            .insert(statement.trim().to_string(), error);
    }

    /// Fail every ledger statement with `error`
    pub fn fail_ledger(&self, error: ExecutorError) {
        self.state.lock().ledger_failure = Some(error);
    }

    /// Fail ledger inserts only, conditional or not
    pub fn fail_claims(&self, error: ExecutorError) {
        self.state.lock().claim_failure = Some(error);
    }

    /// Fail the ledger's `CREATE TABLE` statement only
    pub fn fail_table_creation(&self, error: ExecutorError) {
        self.state.lock().create_failure = Some(error);
    }

    /// Fail ledger row deletes only, leaving claims and reads working
    pub fn fail_deletes(&self, error: ExecutorError) {
        self.state.lock().delete_failure = Some(error);
    }

    /// Fail checksum reads for the ledger row of `name`
    pub fn fail_checksum_read(&self, name: &str, error: ExecutorError) {
        self.state
            .lock()
            .checksum_read_failures
            .insert(name.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.statement_failures.clear();
        state.checksum_read_failures.clear();
        state.ledger_failure = None;
        state.claim_failure = None;
        state.create_failure = None;
        state.delete_failure = None;
    }

    /// Seed a ledger row directly, as if a previous run had recorded it
    pub fn insert_ledger_row(&self, name: &str, checksum: &str) {
        let mut state = self.state.lock();
        state.table_created = true;
        state.rows.insert(name.to_string(), checksum.to_string());
    }

    /// Non-ledger statements executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    pub fn ledger_checksum(&self, name: &str) -> Option<String> {
        self.state.lock().rows.get(name).cloned()
    }

    pub fn ledger_table_exists(&self) -> bool {
        self.state.lock().table_created
    }

    /// Number of `CREATE TABLE` statements the ledger issued
    pub fn table_creations(&self) -> usize {
        self.state.lock().table_creations
    }

    /// Number of ledger inserts attempted, conditional or not
    pub fn claim_attempts(&self) -> usize {
        self.state.lock().claim_attempts
    }

    fn check_ledger(state: &State) -> ExecutorResult<()> {
        match &state.ledger_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check_table(state: &State) -> ExecutorResult<()> {
        if state.table_created {
            Ok(())
        } else {
            Err(ExecutorError::Query("unconfigured table migrations".to_string()))
        }
    }

    fn begin_claim(state: &mut State) -> ExecutorResult<()> {
        Self::check_ledger(state)?;
        state.claim_attempts += 1;
        if let Some(error) = &state.claim_failure {
            return Err(error.clone());
        }
        Self::check_table(state)
    }
}

fn text_param(params: &[Value], index: usize) -> ExecutorResult<String> {
    params
        .get(index)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| ExecutorError::Query(format!("missing text bind value at position {}", index)))
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(&self, statement: &str, params: &[Value]) -> ExecutorResult<()> {
        let mut state = self.state.lock();

        match statement {
            CREATE_TABLE_CQL => {
                Self::check_ledger(&state)?;
                if let Some(error) = &state.create_failure {
                    return Err(error.clone());
                }
                state.table_creations += 1;
                state.table_created = true;
                Ok(())
            }
            CLAIM_OVERWRITE_CQL => {
                Self::begin_claim(&mut state)?;
                let name = text_param(params, 0)?;
                let checksum = text_param(params, 1)?;
                state.rows.insert(name, checksum);
                Ok(())
            }
            _ => {
                let statement = statement.trim();
                if let Some(error) = state.statement_failures.get(statement) {
                    return Err(error.clone());
                }
                state.executed.push(statement.to_string());
                Ok(())
            }
        }
    }

    async fn query_one(&self, query: &str, params: &[Value]) -> ExecutorResult<Option<Row>> {
        if query == CLAIM_EXCLUSIVE_CQL {
            if let Some(barrier) = &self.claim_barrier {
                barrier.wait().await;
            }

            let mut state = self.state.lock();
            Self::begin_claim(&mut state)?;
            let name = text_param(params, 0)?;
            let checksum = text_param(params, 1)?;

            let row = match state.rows.get(&name) {
                Some(existing) => Row::new()
                    .with(APPLIED_COLUMN, false)
                    .with("name", name.clone())
                    .with("checksum", existing.clone()),
                None => {
                    state.rows.insert(name, checksum);
                    Row::new().with(APPLIED_COLUMN, true)
                }
            };
            return Ok(Some(row));
        }

        let mut state = self.state.lock();
        Self::check_ledger(&state)?;

        match query {
            TABLE_EXISTS_CQL => {
                let keyspace = text_param(params, 0)?;
                let visible = self.keyspace.as_ref().map_or(true, |own| *own == keyspace);
                if state.table_created && visible {
                    Ok(Some(Row::new().with("table_name", "migrations")))
                } else {
                    Ok(None)
                }
            }
            SELECT_CHECKSUM_CQL => {
                Self::check_table(&state)?;
                let name = text_param(params, 0)?;
                if let Some(error) = state.checksum_read_failures.get(&name) {
                    return Err(error.clone());
                }
                Ok(state
                    .rows
                    .get(&name)
                    .map(|checksum| Row::new().with("checksum", checksum.clone())))
            }
            DELETE_CQL => {
                if let Some(error) = &state.delete_failure {
                    return Err(error.clone());
                }
                Self::check_table(&state)?;
                let name = text_param(params, 0)?;
                let existed = state.rows.remove(&name).is_some();
                Ok(Some(Row::new().with(APPLIED_COLUMN, existed)))
            }
            other => Err(ExecutorError::Query(format!("unsupported query: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_non_ledger_statements() {
        let store = MemoryExecutor::new();
        store.execute("  CREATE TABLE users (id uuid PRIMARY KEY) ", &[]).await.unwrap();
        store.execute(CREATE_TABLE_CQL, &[]).await.unwrap();

        assert_eq!(store.executed(), vec!["CREATE TABLE users (id uuid PRIMARY KEY)"]);
        assert!(store.ledger_table_exists());
    }

    #[tokio::test]
    async fn test_conditional_insert_reports_existing_row() {
        let store = MemoryExecutor::new();
        store.insert_ledger_row("0001_init", "abc");

        let row = store
            .query_one(CLAIM_EXCLUSIVE_CQL, &["0001_init".into(), "def".into()])
            .await
            .unwrap()
            .unwrap();

        assert!(!row.flag(APPLIED_COLUMN).unwrap());
        assert_eq!(row.text("checksum").unwrap(), "abc");
        assert_eq!(store.ledger_checksum("0001_init"), Some("abc".to_string()));
    }

    #[tokio::test]
    async fn test_conditional_delete_reports_whether_row_existed() {
        let store = MemoryExecutor::new();
        store.insert_ledger_row("0001_init", "abc");

        let removed = store.query_one(DELETE_CQL, &["0001_init".into()]).await.unwrap().unwrap();
        let missing = store.query_one(DELETE_CQL, &["0001_init".into()]).await.unwrap().unwrap();

        assert!(removed.flag(APPLIED_COLUMN).unwrap());
        assert!(!missing.flag(APPLIED_COLUMN).unwrap());
        assert_eq!(store.ledger_checksum("0001_init"), None);
    }

    #[tokio::test]
    async fn test_targeted_failures_leave_other_statements_working() {
        let store = MemoryExecutor::new();
        store.fail_table_creation(ExecutorError::Query("keyspace does not exist".to_string()));
        assert!(store.execute(CREATE_TABLE_CQL, &[]).await.is_err());
        assert!(!store.ledger_table_exists());

        store.insert_ledger_row("0001_init", "abc");
        store.fail_deletes(ExecutorError::Connection("host down".to_string()));
        store.fail_checksum_read("0002_users", ExecutorError::Connection("read timeout".to_string()));

        assert!(store.query_one(DELETE_CQL, &["0001_init".into()]).await.is_err());
        assert!(store
            .query_one(SELECT_CHECKSUM_CQL, &["0002_users".into()])
            .await
            .is_err());
        let row = store
            .query_one(SELECT_CHECKSUM_CQL, &["0001_init".into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.text("checksum").unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_keyspace_scoped_metadata() {
        let store = MemoryExecutor::for_keyspace("accounts");
        store.execute(CREATE_TABLE_CQL, &[]).await.unwrap();

        assert!(store.query_one(TABLE_EXISTS_CQL, &["accounts".into()]).await.unwrap().is_some());
        assert!(store.query_one(TABLE_EXISTS_CQL, &["billing".into()]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_reads_require_table() {
        let store = MemoryExecutor::new();
        let err = store
            .query_one(SELECT_CHECKSUM_CQL, &["0001_init".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Query(_)));
    }

    #[tokio::test]
    async fn test_unknown_queries_are_rejected() {
        let store = MemoryExecutor::new();
        assert!(store.query_one("SELECT now() FROM system.local", &[]).await.is_err());
    }
}

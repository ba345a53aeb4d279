//! Executor adapter
//!
//! The migration core never talks to a driver directly. It hands statement
//! text and bound values to an [`Executor`], which wraps whatever session the
//! application already holds.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ExecutorError, ExecutorResult};

/// Value bound to a statement placeholder or read back from a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// A single result row, columns kept in the order the store returned them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    /// Get a column value by name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Read a text column, failing if it is missing or not text
    pub fn text(&self, column: &str) -> ExecutorResult<&str> {
        self.get(column)
            .and_then(Value::as_text)
            .ok_or_else(|| missing_column(column, "text"))
    }

    /// Read a boolean column, failing if it is missing or not a boolean
    pub fn flag(&self, column: &str) -> ExecutorResult<bool> {
        self.get(column)
            .and_then(Value::as_bool)
            .ok_or_else(|| missing_column(column, "boolean"))
    }
}

fn missing_column(column: &str, kind: &str) -> ExecutorError {
    ExecutorError::UnexpectedResult(format!("expected {} column '{}' in result row", kind, column))
}

/// Opaque capability over a database session
///
/// Implementations must report "no rows" from [`query_one`](Executor::query_one)
/// as `Ok(None)`, never as an error, so that an absent ledger row can be told
/// apart from a failing store.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one statement that returns no rows
    async fn execute(&self, statement: &str, params: &[Value]) -> ExecutorResult<()>;

    /// Run a query expected to yield zero or one row
    async fn query_one(&self, query: &str, params: &[Value]) -> ExecutorResult<Option<Row>>;
}

#[async_trait]
impl<'a, E: Executor + ?Sized> Executor for &'a E {
    async fn execute(&self, statement: &str, params: &[Value]) -> ExecutorResult<()> {
        (**self).execute(statement, params).await
    }

    async fn query_one(&self, query: &str, params: &[Value]) -> ExecutorResult<Option<Row>> {
        (**self).query_one(query, params).await
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn execute(&self, statement: &str, params: &[Value]) -> ExecutorResult<()> {
        (**self).execute(statement, params).await
    }

    async fn query_one(&self, query: &str, params: &[Value]) -> ExecutorResult<Option<Row>> {
        (**self).query_one(query, params).await
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    async fn execute(&self, statement: &str, params: &[Value]) -> ExecutorResult<()> {
        (**self).execute(statement, params).await
    }

    async fn query_one(&self, query: &str, params: &[Value]) -> ExecutorResult<Option<Row>> {
        (**self).query_one(query, params).await
    }
}

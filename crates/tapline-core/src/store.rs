//! External data store collaborator.
//!
//! The core only needs two shapes of statement: a point lookup returning at
//! most one row, and a keyed update used to set up test data. Harnesses plug
//! their database client in behind [`DataStore`]; [`MemoryStore`] is the
//! in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Errors reported by a data store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not open a connection.
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// The statement was rejected or failed mid-flight.
    #[error("Store query failed: {0}")]
    Query(String),

    /// A row another lookup depends on does not exist.
    #[error("No row in {table} for key {key}")]
    MissingRow { table: String, key: String },

    /// A row exists but lacks an expected column.
    #[error("Column {column} missing from {table}")]
    MissingColumn { table: String, column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// `true` for failures that may clear up on a later attempt.
    ///
    /// Missing rows and columns describe the data itself and will not change
    /// by asking again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_) | StoreError::Query(_) | StoreError::Io(_)
        )
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    Int(i64),
    Text(String),
}

impl StoreValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::Text(s) => Some(s),
            StoreValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoreValue::Int(n) => Some(*n),
            StoreValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Int(n) => write!(f, "{n}"),
            StoreValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::Text(value.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        StoreValue::Text(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Int(value)
    }
}

/// Column name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, StoreValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<StoreValue>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&StoreValue> {
        self.0.get(column)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(StoreValue::as_str)
    }

    /// Column value rendered as a string, whatever its stored type.
    pub fn string(&self, column: &str) -> Option<String> {
        self.get(column).map(ToString::to_string)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(StoreValue::as_int)
    }

    fn set(&mut self, column: &str, value: StoreValue) {
        self.0.insert(column.to_string(), value);
    }

    fn project(&self, columns: &[String]) -> Row {
        if columns.is_empty() {
            return self.clone();
        }
        Row(self
            .0
            .iter()
            .filter(|(name, _)| columns.iter().any(|c| c == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }
}

/// `SELECT TOP 1 columns FROM table WHERE key_column = key [ORDER BY order_by_desc DESC]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointQuery {
    pub table: String,
    pub key_column: String,
    pub key: StoreValue,
    /// Columns to return. Empty means all.
    pub columns: Vec<String>,
    /// When several rows match, return the one with the greatest value here.
    pub order_by_desc: Option<String>,
}

impl PointQuery {
    pub fn new(
        table: impl Into<String>,
        key_column: impl Into<String>,
        key: impl Into<StoreValue>,
    ) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            key: key.into(),
            columns: Vec::new(),
            order_by_desc: None,
        }
    }

    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn latest_by(mut self, column: impl Into<String>) -> Self {
        self.order_by_desc = Some(column.into());
        self
    }
}

/// `UPDATE table SET set... WHERE filters...` (all filters must match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedUpdate {
    pub table: String,
    pub set: Vec<(String, StoreValue)>,
    pub filters: Vec<(String, StoreValue)>,
}

impl KeyedUpdate {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<StoreValue>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<StoreValue>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }
}

/// Opens connections to the backing store.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

/// One open connection. Dropping it closes the connection.
#[async_trait]
pub trait StoreConnection: Send {
    /// At most one row matching `query`.
    async fn lookup(&mut self, query: &PointQuery) -> Result<Option<Row>, StoreError>;

    /// Apply `update`, returning the number of rows changed.
    async fn update(&mut self, update: &KeyedUpdate) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    opened: AtomicUsize,
    open: AtomicUsize,
    failing_connects: AtomicU32,
}

/// In-memory [`DataStore`].
///
/// Clones share the same tables. Connection counters make it possible to
/// check that callers open and close one connection per attempt.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, table: impl Into<String>, row: Row) {
        self.state
            .tables
            .lock()
            .await
            .entry(table.into())
            .or_default()
            .push(row);
    }

    /// All rows of `table`, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `n` calls to [`DataStore::connect`] fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Connections opened so far.
    pub fn connections_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn connections_open(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let failing = self
            .state
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Connection("connection refused".to_string()));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state.open.fetch_add(1, Ordering::SeqCst);
        trace!("memory store connection opened");
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryConnection {
    state: Arc<MemoryState>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn lookup(&mut self, query: &PointQuery) -> Result<Option<Row>, StoreError> {
        let tables = self.state.tables.lock().await;
        let Some(rows) = tables.get(&query.table) else {
            return Err(StoreError::Query(format!("unknown table {}", query.table)));
        };

        let mut matches: Vec<&Row> = rows
            .iter()
            .filter(|row| row.get(&query.key_column) == Some(&query.key))
            .collect();
        if let Some(order) = &query.order_by_desc {
            matches.sort_by(|a, b| b.get(order).cmp(&a.get(order)));
        }

        let found = matches.first().map(|row| row.project(&query.columns));
        debug!(table = %query.table, key = %query.key, found = found.is_some(), "point lookup");
        Ok(found)
    }

    async fn update(&mut self, update: &KeyedUpdate) -> Result<u64, StoreError> {
        let mut tables = self.state.tables.lock().await;
        let Some(rows) = tables.get_mut(&update.table) else {
            return Err(StoreError::Query(format!("unknown table {}", update.table)));
        };

        let mut changed = 0;
        for row in rows.iter_mut() {
            let selected = update
                .filters
                .iter()
                .all(|(column, value)| row.get(column) == Some(value));
            if selected {
                for (column, value) in &update.set {
                    row.set(column, value.clone());
                }
                changed += 1;
            }
        }
        debug!(table = %update.table, changed, "keyed update");
        Ok(changed)
    }
}

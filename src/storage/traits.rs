//! Abstract storage interface for the hosted data service
//!
//! Rows travel as JSON objects; typed views live in [`crate::storage::models`].
//! Every call states which credential it runs under, so row-level access
//! control on the provider side applies to caller-scoped reads and writes.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Credential a data-store call is made with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAuth {
    /// The caller's own bearer token (row-level security applies)
    Caller(String),
    /// The elevated service credential. Admin paths only.
    Service,
}

/// Row predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    In(String, Vec<String>),
    /// Case-insensitive substring match on any of the columns
    Search(Vec<String>, String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<String>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn is_in(column: &str, values: Vec<String>) -> Self {
        Filter::In(column.to_string(), values)
    }

    /// Search `columns` for `term`. Characters with meaning in a REST filter
    /// expression are dropped; `None` when nothing searchable remains.
    pub fn search(columns: &[&str], term: &str) -> Option<Self> {
        let term: String = term
            .trim()
            .chars()
            .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '"' | '\\' | ':'))
            .collect();
        if term.trim().is_empty() || columns.is_empty() {
            return None;
        }
        Some(Filter::Search(
            columns.iter().map(|c| c.to_string()).collect(),
            term.trim().to_lowercase(),
        ))
    }
}

/// Sort order for selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Select parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Behaviour of an insert whose primary key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Surface the conflict as an error
    Fail,
    /// Keep the existing row untouched and return no rows
    Ignore,
}

/// Generic data store over the provider's tables
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Select rows matching `query`
    async fn select(&self, table: &str, query: &Query, auth: StoreAuth) -> Result<Vec<Value>>;

    /// Insert one row and return the rows actually written
    async fn insert(
        &self,
        table: &str,
        row: Value,
        on_conflict: OnConflict,
        auth: StoreAuth,
    ) -> Result<Vec<Value>>;

    /// Patch rows matching `filters` and return the updated rows
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        auth: StoreAuth,
    ) -> Result<Vec<Value>>;

    /// Delete rows matching `filters` and return how many were removed
    async fn delete(&self, table: &str, filters: &[Filter], auth: StoreAuth) -> Result<usize>;

    /// Count rows matching `filters`
    async fn count(&self, table: &str, filters: &[Filter], auth: StoreAuth) -> Result<usize>;

    /// Backend name for logging/debugging
    fn store_name(&self) -> &'static str;
}

/// Decode a list of JSON rows into typed records
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

/// Decode the first row, if any
pub fn decode_first<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

//! In-memory data store for development and testing
//!
//! Keeps every table as an ordered list of JSON rows. The primary key is the
//! `id` column; inserts with an existing `id` either fail or are ignored
//! atomically under the table lock, mirroring an ignore-duplicates upsert.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::*;
use crate::error::{GymTrackerError, Result};

/// In-memory table storage
pub struct MemoryDataStore {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of rows currently in `table`
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare a stored JSON value with a filter literal the way PostgREST does
fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Bool(b) => b.to_string() == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Null => expected == "null",
        _ => false,
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, expected) => row
            .get(column)
            .map(|v| value_matches(v, expected))
            .unwrap_or(false),
        Filter::In(column, values) => row
            .get(column)
            .map(|v| values.iter().any(|expected| value_matches(v, expected)))
            .unwrap_or(false),
        Filter::Search(columns, term) => columns.iter().any(|column| {
            row.get(column)
                .and_then(Value::as_str)
                .map(|text| text.to_lowercase().contains(term.as_str()))
                .unwrap_or(false)
        }),
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Greater,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false))
}

fn as_object(row: Value) -> Result<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        other => Err(GymTrackerError::Validation(format!(
            "Row must be a JSON object, got {}",
            other
        ))),
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn select(&self, table: &str, query: &Query, _auth: StoreAuth) -> Result<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(ref order) = query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(offset) = query.offset {
            rows.drain(..offset.min(rows.len()));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        on_conflict: OnConflict,
        _auth: StoreAuth,
    ) -> Result<Vec<Value>> {
        let mut row = as_object(row)?;
        let id = match row.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(GymTrackerError::Validation(format!(
                    "Row id must be a string, got {}",
                    other
                )))
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let now = timestamp_now();
        row.entry("created_at").or_insert_with(|| now.clone());
        row.entry("updated_at").or_insert(now);

        // Existence check and insert happen under one write lock
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        let exists = rows
            .iter()
            .any(|existing| existing.get("id").and_then(Value::as_str) == Some(id.as_str()));
        if exists {
            return match on_conflict {
                OnConflict::Ignore => Ok(Vec::new()),
                OnConflict::Fail => Err(GymTrackerError::Storage(format!(
                    "duplicate key {} in {}",
                    id, table
                ))),
            };
        }

        let row = Value::Object(row);
        rows.push(row.clone());
        Ok(vec![row])
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        _auth: StoreAuth,
    ) -> Result<Vec<Value>> {
        let patch = as_object(patch)?;
        let now = timestamp_now();
        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| row_matches(row, filters)) {
                if let Value::Object(map) = row {
                    for (key, value) in patch.iter() {
                        if key != "id" {
                            map.insert(key.clone(), value.clone());
                        }
                    }
                    map.insert("updated_at".to_string(), now.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter], _auth: StoreAuth) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let removed = match tables.get_mut(table) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|row| !row_matches(row, filters));
                before - rows.len()
            }
            None => 0,
        };
        Ok(removed)
    }

    async fn count(&self, table: &str, filters: &[Filter], _auth: StoreAuth) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| row_matches(row, filters)).count())
            .unwrap_or(0))
    }

    fn store_name(&self) -> &'static str {
        "MEMORY"
    }
}

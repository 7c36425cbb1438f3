// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory `DirectoryClient` double for daemon unit tests. Keeps rows
//! as untyped JSON so it can host any table's schema, and enforces the same
//! `If-Match` optimistic-concurrency contract as the real client so claim
//! races can be exercised without a network.

use crate::client::{DirectoryClient, UpdateOutcome};
use crate::query::ODataQuery;
use async_trait::async_trait;
use mesh_core::{CoordinationError, ETag};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

struct StoredRow {
    value: Value,
    etag: ETag,
}

#[derive(Default)]
pub struct FakeDirectoryClient {
    tables: Mutex<HashMap<String, HashMap<String, StoredRow>>>,
    next_id: Mutex<u64>,
}

impl FakeDirectoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row directly, bypassing `create_row`. Useful for setting up
    /// fixture state before exercising a poll loop.
    pub fn seed(&self, table: &str, id: &str, mut value: Value) {
        let etag = ETag::new(format!("W/\"{id}-0\""));
        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), Value::String(id.to_string()));
        }
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(
                id.to_string(),
                StoredRow {
                    value,
                    etag,
                },
            );
    }

    fn next_id(&self) -> String {
        let mut guard = self.next_id.lock();
        *guard += 1;
        format!("fake-{}", *guard)
    }

    fn matches_filter(row: &Value, filter: &str) -> bool {
        // Supports the single shape this codebase's filters reduce to after
        // splitting on " and ": `column eq 'value'` or `column eq N`.
        filter
            .split(" and ")
            .all(|clause| Self::matches_clause(row, clause.trim()))
    }

    fn matches_clause(row: &Value, clause: &str) -> bool {
        let Some((column, rhs)) = clause.split_once(" eq ") else {
            return true;
        };
        let column = column.trim();
        let rhs = rhs.trim();
        if rhs == "null" {
            return row.get(column).map(Value::is_null).unwrap_or(true);
        }
        if let Some(quoted) = rhs.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return row.get(column).and_then(Value::as_str) == Some(quoted);
        }
        if let Ok(n) = rhs.parse::<i64>() {
            return row.get(column).and_then(Value::as_i64) == Some(n);
        }
        true
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectoryClient {
    async fn get_rows<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        query: &ODataQuery,
    ) -> Result<Vec<(T, Option<ETag>)>, CoordinationError> {
        let guard = self.tables.lock();
        let Some(rows) = guard.get(table) else {
            return Ok(Vec::new());
        };
        let params = query.to_params();
        let filter = params.iter().find(|(k, _)| *k == "$filter").map(|(_, v)| v.clone());
        let top = params
            .iter()
            .find(|(k, _)| *k == "$top")
            .and_then(|(_, v)| v.parse::<usize>().ok());
        let orderby = params.iter().find(|(k, _)| *k == "$orderby").map(|(_, v)| v.clone());

        let mut matching: Vec<&StoredRow> = rows
            .values()
            .filter(|r| filter.as_deref().map(|f| Self::matches_filter(&r.value, f)).unwrap_or(true))
            .collect();
        // Stable-sort by row id first so ties (including "no orderby given") are
        // deterministic rather than resting on HashMap iteration order.
        matching.sort_by(|a, b| a.value.get("id").cmp(&b.value.get("id")));
        if let Some(orderby) = orderby {
            let descending = orderby.trim_end().ends_with(" desc");
            let field = orderby
                .split_whitespace()
                .next()
                .unwrap_or(orderby.as_str())
                .to_string();
            matching.sort_by(|a, b| {
                let ord = a
                    .value
                    .get(&field)
                    .and_then(Value::as_str)
                    .cmp(&b.value.get(&field).and_then(Value::as_str));
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(top) = top {
            matching.truncate(top);
        }

        matching
            .into_iter()
            .map(|r| {
                let typed: T = serde_json::from_value(r.value.clone())
                    .map_err(|e| CoordinationError::SchemaMismatch(e.to_string()))?;
                Ok((typed, Some(r.etag.clone())))
            })
            .collect()
    }

    async fn get_row<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        id: &str,
        _select: Option<&[&str]>,
    ) -> Result<Option<(T, Option<ETag>)>, CoordinationError> {
        let guard = self.tables.lock();
        let Some(row) = guard.get(table).and_then(|t| t.get(id)) else {
            return Ok(None);
        };
        let typed: T = serde_json::from_value(row.value.clone())
            .map_err(|e| CoordinationError::SchemaMismatch(e.to_string()))?;
        Ok(Some((typed, Some(row.etag.clone()))))
    }

    async fn create_row<T: Serialize + Send + Sync>(
        &self,
        table: &str,
        fields: &T,
        _return_representation: bool,
    ) -> Result<String, CoordinationError> {
        let id = self.next_id();
        let mut value =
            serde_json::to_value(fields).map_err(|e| CoordinationError::LogicError(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        self.seed(table, &id, value);
        Ok(id)
    }

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        fields: Value,
        etag: Option<&ETag>,
    ) -> Result<UpdateOutcome, CoordinationError> {
        let mut guard = self.tables.lock();
        let Some(row) = guard.get_mut(table).and_then(|t| t.get_mut(id)) else {
            return Err(CoordinationError::LogicError(format!(
                "no such row {table}({id})"
            )));
        };
        if let Some(etag) = etag {
            if *etag != row.etag {
                return Ok(UpdateOutcome::Conflict);
            }
        }
        if let (Value::Object(existing), Value::Object(patch)) = (&mut row.value, &fields) {
            for (k, v) in patch {
                existing.insert(k.clone(), v.clone());
            }
        }
        let generation: u64 = row
            .etag
            .as_str()
            .rsplit('-')
            .next()
            .and_then(|s| s.trim_end_matches('"').parse().ok())
            .unwrap_or(0);
        row.etag = ETag::new(format!("W/\"{id}-{}\"", generation + 1));
        Ok(UpdateOutcome::Ok)
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<(), CoordinationError> {
        if let Some(rows) = self.tables.lock().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn find_rows<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<(T, Option<ETag>)>, CoordinationError> {
        let query = ODataQuery::new().filter(format!("{column} eq '{value}'"));
        self.get_rows(table, &query).await
    }

    async fn upsert_row<T: Serialize + Send + Sync>(
        &self,
        table: &str,
        key_column: &str,
        key_value: &str,
        fields: &T,
    ) -> Result<(), CoordinationError> {
        let existing_id = {
            let guard = self.tables.lock();
            guard.get(table).and_then(|rows| {
                rows.iter()
                    .find(|(_, r)| r.value.get(key_column).and_then(Value::as_str) == Some(key_value))
                    .map(|(id, _)| id.clone())
            })
        };
        let fields_value =
            serde_json::to_value(fields).map_err(|e| CoordinationError::LogicError(e.to_string()))?;
        match existing_id {
            Some(id) => {
                self.update_row(table, &id, fields_value, None).await?;
            }
            None => {
                self.create_row(table, fields, false).await?;
            }
        }
        Ok(())
    }
}

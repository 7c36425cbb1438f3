// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed directory-store client. `HttpDirectoryClient` is the real
//! implementation over `reqwest`; `FakeDirectoryClient` (test-support,
//! in-memory) implements the same trait for daemon unit tests.

use crate::query::ODataQuery;
use crate::response::{entity_id_from_header, etag_from_row, RowEnvelope};
use crate::token::TokenProvider;
use async_trait::async_trait;
use mesh_core::{CoordinationError, ETag};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Request timeout for every directory-store call (`SPEC_FULL.md` §4.1).
/// Exceeding this is a retriable I/O failure, not a logical failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of an `If-Match`-guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Ok,
    /// HTTP 412 — another claimant won the race. Not an error.
    Conflict,
}

/// Table-name configuration, one field per table named in `SPEC_FULL.md` §6's
/// environment variables.
#[derive(Debug, Clone)]
pub struct DirectoryTables {
    pub base_url: String,
    pub conversations: String,
    pub users: String,
    pub tasks: String,
    pub messages: String,
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn get_rows<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        query: &ODataQuery,
    ) -> Result<Vec<(T, Option<ETag>)>, CoordinationError>;

    async fn get_row<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        id: &str,
        select: Option<&[&str]>,
    ) -> Result<Option<(T, Option<ETag>)>, CoordinationError>;

    async fn create_row<T: Serialize + Send + Sync>(
        &self,
        table: &str,
        fields: &T,
        return_representation: bool,
    ) -> Result<String, CoordinationError>;

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        fields: Value,
        etag: Option<&ETag>,
    ) -> Result<UpdateOutcome, CoordinationError>;

    async fn delete_row(&self, table: &str, id: &str) -> Result<(), CoordinationError>;

    async fn find_rows<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<(T, Option<ETag>)>, CoordinationError>;

    async fn upsert_row<T: Serialize + Send + Sync>(
        &self,
        table: &str,
        key_column: &str,
        key_value: &str,
        fields: &T,
    ) -> Result<(), CoordinationError>;
}

pub struct HttpDirectoryClient<P> {
    http: reqwest::Client,
    tables: DirectoryTables,
    tokens: crate::token::TokenCache<P>,
}

impl<P: TokenProvider> HttpDirectoryClient<P> {
    pub fn new(tables: DirectoryTables, token_provider: P) -> Self {
        Self {
            http: reqwest::Client::new(),
            tables,
            tokens: crate::token::TokenCache::new(token_provider),
        }
    }

    pub fn tables(&self) -> &DirectoryTables {
        &self.tables
    }

    async fn headers(
        &self,
        content_type: Option<&str>,
        etag: Option<&ETag>,
    ) -> Result<reqwest::header::HeaderMap, CoordinationError> {
        let token = self.tokens.token().await?;
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {token}");
        insert_header(&mut headers, "Authorization", &auth)?;
        insert_header(&mut headers, "Accept", "application/json")?;
        insert_header(&mut headers, "OData-MaxVersion", "4.0")?;
        insert_header(&mut headers, "OData-Version", "4.0")?;
        if let Some(ct) = content_type {
            insert_header(&mut headers, "Content-Type", ct)?;
        }
        if let Some(etag) = etag {
            insert_header(&mut headers, "If-Match", etag.as_str())?;
        }
        Ok(headers)
    }

    fn row_url(&self, table: &str, id: &str) -> String {
        format!("{}/{}({})", self.tables.base_url, table, id)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.tables.base_url, table)
    }

    fn map_transport_error(err: reqwest::Error) -> CoordinationError {
        if err.is_timeout() {
            CoordinationError::TransientIo(format!("request timed out: {err}"))
        } else {
            CoordinationError::TransientIo(err.to_string())
        }
    }
}

fn insert_header(
    headers: &mut reqwest::header::HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<(), CoordinationError> {
    let value = reqwest::header::HeaderValue::from_str(value)
        .map_err(|e| CoordinationError::LogicError(format!("invalid header value: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

#[async_trait]
impl<P: TokenProvider + Send + Sync> DirectoryClient for HttpDirectoryClient<P> {
    async fn get_rows<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        query: &ODataQuery,
    ) -> Result<Vec<(T, Option<ETag>)>, CoordinationError> {
        let headers = self.headers(None, None).await?;
        let resp = self
            .http
            .get(self.table_url(table))
            .headers(headers)
            .query(&query.to_params())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "GET {table} returned {}",
                resp.status()
            )));
        }

        let envelope: RowEnvelope = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;

        envelope
            .rows
            .into_iter()
            .map(|row| {
                let etag = etag_from_row(&row);
                let typed: T = serde_json::from_value(row)
                    .map_err(|e| CoordinationError::SchemaMismatch(e.to_string()))?;
                Ok((typed, etag))
            })
            .collect()
    }

    async fn get_row<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        id: &str,
        select: Option<&[&str]>,
    ) -> Result<Option<(T, Option<ETag>)>, CoordinationError> {
        let headers = self.headers(None, None).await?;
        let mut req = self
            .http
            .get(self.row_url(table, id))
            .headers(headers)
            .timeout(REQUEST_TIMEOUT);
        if let Some(select) = select {
            req = req.query(&[("$select", select.join(","))]);
        }
        let resp = req.send().await.map_err(Self::map_transport_error)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "GET {table}({id}) returned {}",
                resp.status()
            )));
        }

        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ETag::new);
        let row: Value = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;
        let etag = etag.or_else(|| etag_from_row(&row));
        let typed: T = serde_json::from_value(row)
            .map_err(|e| CoordinationError::SchemaMismatch(e.to_string()))?;
        Ok(Some((typed, etag)))
    }

    async fn create_row<T: Serialize + Send + Sync>(
        &self,
        table: &str,
        fields: &T,
        return_representation: bool,
    ) -> Result<String, CoordinationError> {
        let mut headers = self.headers(Some("application/json"), None).await?;
        if return_representation {
            insert_header(&mut headers, "Prefer", "return=representation")?;
        }
        let resp = self
            .http
            .post(self.table_url(table))
            .headers(headers)
            .json(fields)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "POST {table} returned {}",
                resp.status()
            )));
        }

        let entity_id_header = resp
            .headers()
            .get("OData-EntityId")
            .and_then(|v| v.to_str().ok())
            .and_then(entity_id_from_header);

        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return entity_id_header.ok_or_else(|| {
                CoordinationError::LogicError(
                    "create returned 204 with no OData-EntityId header".to_string(),
                )
            });
        }

        let row: Value = resp
            .json()
            .await
            .map_err(|e| CoordinationError::TransientIo(format!("bad response body: {e}")))?;
        row.get("cr_shraga_taskid")
            .or_else(|| row.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(entity_id_header)
            .ok_or_else(|| CoordinationError::LogicError("created row has no id".to_string()))
    }

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        fields: Value,
        etag: Option<&ETag>,
    ) -> Result<UpdateOutcome, CoordinationError> {
        let headers = self.headers(Some("application/json"), etag).await?;
        let resp = self
            .http
            .patch(self.row_url(table, id))
            .headers(headers)
            .json(&fields)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if resp.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            return Ok(UpdateOutcome::Conflict);
        }
        if resp.status() == reqwest::StatusCode::BAD_REQUEST {
            // Likely an optional column that doesn't exist yet. The caller
            // is responsible for the drop-and-retry per SchemaMismatch policy;
            // surface it distinctly so callers can detect this case.
            let body = resp.text().await.unwrap_or_default();
            return Err(CoordinationError::SchemaMismatch(body));
        }
        if !resp.status().is_success() {
            return Err(CoordinationError::TransientIo(format!(
                "PATCH {table}({id}) returned {}",
                resp.status()
            )));
        }
        Ok(UpdateOutcome::Ok)
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<(), CoordinationError> {
        let headers = self.headers(None, None).await?;
        let resp = self
            .http
            .delete(self.row_url(table, id))
            .headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(CoordinationError::TransientIo(format!(
                "DELETE {table}({id}) returned {}",
                resp.status()
            )));
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
        let query = ODataQuery::new()
            .filter(format!("{key_column} eq '{key_value}'"))
            .top(1);
        let existing: Vec<(Value, Option<ETag>)> = self.get_rows(table, &query).await?;
        match existing.into_iter().next() {
            Some((row, etag)) => {
                let id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoordinationError::LogicError("row has no id".to_string()))?
                    .to_string();
                let fields_value = serde_json::to_value(fields)
                    .map_err(|e| CoordinationError::LogicError(e.to_string()))?;
                self.update_row(table, &id, fields_value, etag.as_ref())
                    .await?;
                Ok(())
            }
            None => {
                self.create_row(table, fields, false).await?;
                Ok(())
            }
        }
    }
}

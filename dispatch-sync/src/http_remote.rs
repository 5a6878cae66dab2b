//! HTTP implementation of the remote-store contract.
//!
//! Talks PostgREST-style endpoints on the hosted backend: api-key header
//! auth, table routes under `/rest/v1/`, predicate query parameters, and a
//! long-poll change feed per table. Uses reqwest with JSON serialization.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use async_trait::async_trait;
use dispatch_types::{ChangeEvent, FieldMap, QueryFilter, Record};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Remote store client for the hosted datastore.
pub struct HttpRemote {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
}

/// One page of the long-poll change feed.
#[derive(Deserialize)]
struct ChangeFeedPage {
    events: Vec<ChangeEvent>,
    next_seq: u64,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, config: &SyncConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            poll_interval: config.change_poll_interval(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// Maps non-success statuses to the error taxonomy. Anything that is
    /// neither a conflict nor a missing row is treated as transient.
    fn check_status(resp: Response, table: &str) -> SyncResult<Response> {
        match resp.status() {
            StatusCode::NOT_FOUND => Err(SyncError::NotFound(format!("{table}: no such row"))),
            StatusCode::CONFLICT => Err(SyncError::Conflict(format!(
                "{table}: uniqueness constraint violated"
            ))),
            status if status.is_client_error() || status.is_server_error() => {
                Err(SyncError::network(format!("{table}: HTTP {status}")))
            }
            _ => Ok(resp),
        }
    }

    /// Decodes a single-record representation. The backend returns an array
    /// for writes with `Prefer: return=representation`; an empty array means
    /// the predicate matched nothing.
    async fn parse_one(resp: Response, table: &str) -> SyncResult<Record> {
        let body: Value = resp.json().await?;
        let object = match &body {
            Value::Array(rows) => rows.first().ok_or_else(|| {
                SyncError::NotFound(format!("{table}: no such row"))
            })?,
            other => other,
        };
        Record::from_wire(object)
            .map_err(|e| SyncError::network(format!("{table}: malformed record in response: {e}")))
    }

    fn filter_params(filter: &QueryFilter) -> Vec<(String, String)> {
        let mut params = Vec::new();
        for (field, value) in filter.eq_predicates() {
            params.push((field.clone(), format!("eq.{}", render(value))));
        }
        for (field, value) in filter.min_predicates() {
            params.push((field.clone(), format!("gte.{}", render(value))));
        }
        for (field, value) in filter.max_predicates() {
            params.push((field.clone(), format!("lte.{}", render(value))));
        }
        if let Some(limit) = filter.limit_value() {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(cursor) = filter.cursor_value() {
            params.push(("offset".into(), cursor.to_string()));
        }
        params
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn insert(&self, table: &str, fields: &FieldMap) -> SyncResult<Record> {
        let resp = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Prefer", "return=representation")
            .json(fields)
            .send()
            .await?;
        let resp = Self::check_status(resp, table)?;
        Self::parse_one(resp, table).await
    }

    async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> SyncResult<Record> {
        let resp = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("apikey", &self.api_key)
            .header("Prefer", "return=representation")
            .json(fields)
            .send()
            .await?;
        let resp = Self::check_status(resp, table)?;
        Self::parse_one(resp, table).await
    }

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        let resp = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("apikey", &self.api_key)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let resp = Self::check_status(resp, table)?;

        // An empty representation means the id matched nothing.
        let body: Value = resp.json().await?;
        match body.as_array() {
            Some(rows) if rows.is_empty() => {
                Err(SyncError::NotFound(format!("{table}: no such row")))
            }
            _ => Ok(()),
        }
    }

    async fn select(&self, table: &str, filter: &QueryFilter) -> SyncResult<Vec<Record>> {
        let resp = self
            .client
            .get(self.table_url(table))
            .query(&Self::filter_params(filter))
            .header("apikey", &self.api_key)
            .send()
            .await?;
        let resp = Self::check_status(resp, table)?;

        let body: Value = resp.json().await?;
        let rows = body
            .as_array()
            .ok_or_else(|| SyncError::network(format!("{table}: expected a JSON array")))?;
        rows.iter()
            .map(|row| {
                Record::from_wire(row).map_err(|e| {
                    SyncError::network(format!("{table}: malformed record in response: {e}"))
                })
            })
            .collect()
    }

    /// Long-polls the table's change feed. The pump stops (closing the
    /// channel) on the first failure or when the receiver goes away; the
    /// change bus owns reconnection.
    async fn open_changes(&self, table: &str) -> SyncResult<mpsc::Receiver<ChangeEvent>> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let url = format!("{}/changes", self.table_url(table));
        let api_key = self.api_key.clone();
        let poll_interval = self.poll_interval;
        let table = table.to_string();

        tokio::spawn(async move {
            let mut since: u64 = 0;
            loop {
                // A quiet feed sends nothing, so the send side would never
                // notice an abandoned receiver; check before each poll.
                if tx.is_closed() {
                    debug!("change feed for {table}: receiver dropped, stopping");
                    return;
                }

                let resp = client
                    .get(&url)
                    .query(&[("since", since.to_string())])
                    .header("apikey", &api_key)
                    .send()
                    .await
                    .and_then(Response::error_for_status);

                let page: ChangeFeedPage = match resp {
                    Ok(resp) => match resp.json().await {
                        Ok(page) => page,
                        Err(e) => {
                            warn!("change feed for {table}: malformed page: {e}");
                            return;
                        }
                    },
                    Err(e) => {
                        warn!("change feed poll for {table} failed: {e}");
                        return;
                    }
                };

                since = page.next_seq;
                for event in page.events {
                    if tx.send(event).await.is_err() {
                        debug!("change feed for {table}: receiver dropped, stopping");
                        return;
                    }
                }

                tokio::time::sleep(poll_interval).await;
            }
        });

        Ok(rx)
    }
}

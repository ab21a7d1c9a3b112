// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use crate::record::MetricRecord;
use crate::{sql, BucketQuery, BucketRow, MetricsStore, StoreError};

/// Upper bound on connections handed out simultaneously.
const MAX_POOL_CONNECTIONS: usize = 5;

/// Rows per INSERT statement. Nine binds per row keeps a chunk well under
/// the protocol's u16 parameter limit.
const INSERT_CHUNK_ROWS: usize = 1000;

/// Metrics store backed by postgres through a small connection pool: a
/// semaphore caps live connections, idle clients are reused, and every
/// operation acquires a connection and releases it as soon as it is done.
pub struct PostgresStore {
    database_url: String,
    semaphore: Semaphore,
    idle: Mutex<VecDeque<Client>>,
}

impl PostgresStore {
    pub fn new(database_url: &str) -> Self {
        PostgresStore {
            database_url: database_url.to_string(),
            semaphore: Semaphore::new(MAX_POOL_CONNECTIONS),
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Create the metrics table and its index when missing. Runs on every
    /// startup; the statements are idempotent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.acquire().await?;
        conn.client().batch_execute(sql::INIT_METRICS_TABLE).await?;
        Ok(())
    }

    async fn acquire(&self) -> Result<PooledClient<'_>, StoreError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| StoreError::PoolClosed)?;
        loop {
            #[allow(clippy::expect_used)]
            let reused = self.idle.lock().expect("lock poisoned").pop_front();
            match reused {
                Some(client) if !client.is_closed() => {
                    return Ok(PooledClient {
                        store: self,
                        _permit: permit,
                        client: Some(client),
                    });
                }
                // Dead idle client; discard it and try the next one.
                Some(_) => continue,
                None => break,
            }
        }
        let (client, connection) = tokio_postgres::connect(&self.database_url, NoTls).await?;
        // The connection future drives the socket; it resolves once the
        // client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection closed: {e}");
            }
        });
        Ok(PooledClient {
            store: self,
            _permit: permit,
            client: Some(client),
        })
    }
}

/// A checked-out connection; returns itself to the pool on drop unless the
/// server closed it.
struct PooledClient<'a> {
    store: &'a PostgresStore,
    _permit: SemaphorePermit<'a>,
    client: Option<Client>,
}

impl PooledClient<'_> {
    #[allow(clippy::expect_used)]
    fn client(&self) -> &Client {
        self.client.as_ref().expect("client is only taken in Drop")
    }

    #[allow(clippy::expect_used)]
    fn client_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("client is only taken in Drop")
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if !client.is_closed() {
                #[allow(clippy::expect_used)]
                self.store
                    .idle
                    .lock()
                    .expect("lock poisoned")
                    .push_back(client);
            }
        }
    }
}

#[async_trait]
impl MetricsStore for PostgresStore {
    async fn insert_metrics(&self, records: &[MetricRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.acquire().await?;
        // One transaction per batch: the whole batch becomes visible to the
        // read side at once, or not at all.
        let tx = conn.client_mut().transaction().await?;
        let mut written = 0;
        for chunk in records.chunks(INSERT_CHUNK_ROWS) {
            let statement = sql::insert_metrics_sql(chunk.len());
            let kinds: Vec<&str> = chunk.iter().map(|r| r.kind.as_str()).collect();
            let paths: Vec<&str> = chunk.iter().map(|r| r.path.as_str()).collect();
            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * sql::INSERT_PARAMS_PER_ROW);
            for (i, record) in chunk.iter().enumerate() {
                params.push(&kinds[i]);
                params.push(&record.date);
                params.push(&record.source);
                params.push(&record.status);
                params.push(&record.service);
                params.push(&record.memory);
                params.push(&record.memory_quota);
                params.push(&record.load);
                params.push(&paths[i]);
            }
            written += tx.execute(statement.as_str(), &params).await?;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.acquire().await?;
        let deleted = conn
            .client()
            .execute(sql::DELETE_METRICS_BEFORE, &[&cutoff])
            .await?;
        Ok(deleted)
    }

    async fn bucket_stats(&self, query: &BucketQuery) -> Result<Vec<BucketRow>, StoreError> {
        let statement = sql::bucket_stats_sql(query.stat, query.classes.is_some());
        let kind = query.kind.as_str();
        let classes: Vec<&str> = query
            .classes
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(|class| class.as_str())
            .collect();
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&kind, &query.from, &query.width_secs];
        if query.classes.is_some() {
            params.push(&classes);
        }
        let conn = self.acquire().await?;
        let rows = conn.client().query(statement.as_str(), &params).await?;
        let mut buckets = Vec::with_capacity(rows.len());
        for row in rows {
            buckets.push(BucketRow {
                bucket: row.try_get("bucket")?,
                count: row.try_get("count")?,
                stat: row.try_get("stat")?,
            });
        }
        Ok(buckets)
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persistence layer for drain metrics: the shared record types, the store
//! trait the pipeline talks to, and the postgres implementation behind it.

pub mod postgres;
pub mod record;
mod sql;

pub use postgres::PostgresStore;
pub use record::{MetricKind, MetricRecord, PathClass};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage-layer failure surfaced to callers. Callers log and contain these;
/// none of them are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("connection pool is shut down")]
    PoolClosed,
}

/// Which per-bucket statistic a dashboard query computes alongside the
/// record count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatKind {
    /// `max(service)`: worst service time seen in the bucket.
    ServiceMax,
    /// `avg(memory)`: mean dyno memory over the bucket.
    MemoryAvg,
    /// Count only; no statistic column.
    RequestCount,
}

/// A windowed, bucket-grouped aggregation request.
#[derive(Clone, Debug)]
pub struct BucketQuery {
    pub kind: MetricKind,
    /// Restrict to these path classes; `None` applies no path condition.
    pub classes: Option<Vec<PathClass>>,
    /// Start of the oldest bucket; only records at or after this count.
    pub from: DateTime<Utc>,
    pub width_secs: i64,
    pub stat: StatKind,
}

/// One non-empty bucket returned by [`MetricsStore::bucket_stats`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketRow {
    /// Bucket index counted from `BucketQuery::from` in `width_secs` steps.
    pub bucket: i64,
    pub count: i64,
    /// Absent for [`StatKind::RequestCount`] queries.
    pub stat: Option<f64>,
}

/// Async facade over the metrics table. The server and the timer tasks only
/// see this trait, so tests can stand in an in-memory double.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Bulk-insert a batch of records; returns the number of rows written.
    async fn insert_metrics(&self, records: &[MetricRecord]) -> Result<u64, StoreError>;

    /// Delete every record dated before `cutoff`; returns the number of
    /// rows removed. Idempotent for a fixed cutoff.
    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Grouped per-bucket counts and statistics for `query`. Only buckets
    /// with at least one matching record come back; callers fill the gaps.
    async fn bucket_stats(&self, query: &BucketQuery) -> Result<Vec<BucketRow>, StoreError>;
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-cardinality series aggregation behind the dashboard endpoints.
//!
//! The store groups matching records into bucket indices relative to the
//! window start; this module owns the window arithmetic and reshapes the
//! sparse grouped rows into a complete, zero-filled series so charts never
//! see a gap where a bucket simply had no records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use logdrain_store::{
    BucketQuery, BucketRow, MetricKind, MetricsStore, PathClass, StatKind, StoreError,
};
use serde_json::{json, Value};
use tracing::error;

/// Bucket layout of a dashboard window: `count` buckets of `width_secs`
/// each, the newest of which is the still-filling partial bucket.
#[derive(Clone, Copy, Debug)]
pub struct BucketSpec {
    pub width_secs: i64,
    pub count: usize,
}

/// One hour of 10 second buckets, used by service time and throughput.
pub const FAST_BUCKETS: BucketSpec = BucketSpec {
    width_secs: 10,
    count: 360,
};

/// Two hours of 10 minute buckets, used by the memory dashboard.
pub const MEMORY_BUCKETS: BucketSpec = BucketSpec {
    width_secs: 600,
    count: 12,
};

impl BucketSpec {
    /// `now` truncated down to the nearest bucket boundary. The newest
    /// bucket spans `[anchor, now)`, narrower than a full width.
    fn anchor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = now.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(self.width_secs), 0).unwrap_or(now)
    }

    /// Start of the oldest bucket in the window.
    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.anchor(now) - Duration::seconds(self.width_secs * (self.count as i64 - 1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Bucket {
    count: i64,
    stat: Option<f64>,
}

/// Distributes grouped rows into a full window of buckets, leaving the gaps
/// at zero. Indices outside `[0, count)` are dropped; the store cannot
/// produce them for records inside the window, but a record stamped in the
/// future would.
fn fill_series(spec: BucketSpec, rows: &[BucketRow]) -> Vec<Bucket> {
    let mut buckets = vec![Bucket { count: 0, stat: None }; spec.count];
    for row in rows {
        if let Ok(index) = usize::try_from(row.bucket) {
            if let Some(bucket) = buckets.get_mut(index) {
                bucket.count = row.count;
                bucket.stat = row.stat;
            }
        }
    }
    buckets
}

/// `{"item": [{"value": <newest>}, [<series>]]}`, series oldest first. An
/// all-gap window still reports a number: the value falls back to 0.
fn item_response(points: Vec<f64>) -> Value {
    let value = points.last().copied().unwrap_or(0.0);
    json!({ "item": [ { "value": value }, points ] })
}

pub struct Dashboard {
    store: Arc<dyn MetricsStore>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Max router service time per 10s bucket over the last hour, for one
    /// path class.
    pub async fn service_series(
        &self,
        class: PathClass,
        now: DateTime<Utc>,
    ) -> Result<Value, StoreError> {
        let spec = FAST_BUCKETS;
        let rows = self
            .query(BucketQuery {
                kind: MetricKind::Router,
                classes: Some(vec![class]),
                from: spec.window_start(now),
                width_secs: spec.width_secs,
                stat: StatKind::ServiceMax,
            })
            .await?;
        let points: Vec<f64> = fill_series(spec, &rows)
            .iter()
            .map(|bucket| bucket.stat.unwrap_or(0.0))
            .collect();
        Ok(item_response(points))
    }

    /// Router requests per second per 10s bucket over the last hour.
    /// `classes` narrows to a path group; unfiltered covers every known
    /// class but never the unclassified rest.
    pub async fn throughput_series(
        &self,
        classes: Option<&[PathClass]>,
        now: DateTime<Utc>,
    ) -> Result<Value, StoreError> {
        let spec = FAST_BUCKETS;
        let filter = classes.unwrap_or(&PathClass::KNOWN);
        let rows = self
            .query(BucketQuery {
                kind: MetricKind::Router,
                classes: Some(filter.to_vec()),
                from: spec.window_start(now),
                width_secs: spec.width_secs,
                stat: StatKind::RequestCount,
            })
            .await?;
        let mut points: Vec<f64> = fill_series(spec, &rows)
            .iter()
            .map(|bucket| bucket.count as f64 / spec.width_secs as f64)
            .collect();
        points.pop(); // newest bucket is partial, drop it from the rate series
        Ok(item_response(points))
    }

    /// Average dyno memory per 10 minute bucket over the last two hours.
    pub async fn memory_series(&self, now: DateTime<Utc>) -> Result<Value, StoreError> {
        let spec = MEMORY_BUCKETS;
        let rows = self
            .query(BucketQuery {
                kind: MetricKind::Web,
                classes: None,
                from: spec.window_start(now),
                width_secs: spec.width_secs,
                stat: StatKind::MemoryAvg,
            })
            .await?;
        let points: Vec<f64> = fill_series(spec, &rows)
            .iter()
            .map(|bucket| bucket.stat.unwrap_or(0.0))
            .collect();
        Ok(item_response(points))
    }

    async fn query(&self, query: BucketQuery) -> Result<Vec<BucketRow>, StoreError> {
        match self.store.bucket_stats(&query).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                error!("bucket query {query:?} failed: {e}");
                Err(e)
            }
        }
    }
}

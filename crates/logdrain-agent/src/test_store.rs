// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory store double shared by unit tests across the crate.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logdrain_store::{BucketQuery, BucketRow, MetricRecord, MetricsStore, StoreError};

/// Records every call it receives and serves canned bucket rows. With
/// `fail` set, every operation returns a storage error instead.
pub(crate) struct RecordingStore {
    pub inserted: Mutex<Vec<MetricRecord>>,
    pub insert_batches: Mutex<Vec<usize>>,
    pub deleted_before: Mutex<Vec<DateTime<Utc>>>,
    pub bucket_queries: Mutex<Vec<BucketQuery>>,
    pub bucket_rows: Mutex<Vec<BucketRow>>,
    pub retained: Mutex<Vec<DateTime<Utc>>>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inserted: Mutex::new(Vec::new()),
            insert_batches: Mutex::new(Vec::new()),
            deleted_before: Mutex::new(Vec::new()),
            bucket_queries: Mutex::new(Vec::new()),
            bucket_rows: Mutex::new(Vec::new()),
            retained: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_rows(rows: Vec<BucketRow>) -> Self {
        let store = Self::new();
        *store.bucket_rows.lock().unwrap() = rows;
        store
    }
}

#[async_trait]
impl MetricsStore for RecordingStore {
    async fn insert_metrics(&self, records: &[MetricRecord]) -> Result<u64, StoreError> {
        if self.fail {
            return Err(StoreError::PoolClosed);
        }
        self.insert_batches.lock().unwrap().push(records.len());
        let mut inserted = self.inserted.lock().unwrap();
        inserted.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if self.fail {
            return Err(StoreError::PoolClosed);
        }
        self.deleted_before.lock().unwrap().push(cutoff);
        let mut retained = self.retained.lock().unwrap();
        let before = retained.len();
        retained.retain(|date| *date >= cutoff);
        Ok((before - retained.len()) as u64)
    }

    async fn bucket_stats(&self, query: &BucketQuery) -> Result<Vec<BucketRow>, StoreError> {
        if self.fail {
            return Err(StoreError::PoolClosed);
        }
        self.bucket_queries.lock().unwrap().push(query.clone());
        Ok(self.bucket_rows.lock().unwrap().clone())
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory queue of classified records awaiting the next commit cycle.

use std::collections::VecDeque;
use std::mem;
use std::sync::Mutex;

use logdrain_store::MetricRecord;
use tracing::warn;

/// Hard cap on queued records. The committer drains every second under
/// normal operation, so a full buffer means the store has been unreachable
/// for a while; the oldest records are evicted first since they age out of
/// every dashboard window soonest.
pub const MAX_PENDING_RECORDS: usize = 50_000;

/// Synchronized queue shared between the ingestion path (appends) and the
/// batch committer (drains). Ordering is not significant downstream; the
/// only contract is that a record appended during a drain lands in the
/// fresh queue and is neither lost nor committed twice.
pub struct MetricBuffer {
    pending: Mutex<VecDeque<MetricRecord>>,
    capacity: usize,
}

impl MetricBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_PENDING_RECORDS)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Queues one record for the next commit cycle, evicting the oldest
    /// queued record when the buffer is at capacity.
    pub fn append(&self, record: MetricRecord) {
        #[allow(clippy::expect_used)]
        let mut pending = self.pending.lock().expect("lock poisoned");
        if pending.len() >= self.capacity {
            pending.pop_front();
            warn!("metric buffer full, dropping oldest record");
        }
        pending.push_back(record);
    }

    /// Takes every queued record in one swap, leaving the buffer empty.
    #[must_use]
    pub fn drain(&self) -> Vec<MetricRecord> {
        #[allow(clippy::expect_used)]
        let mut pending = self.pending.lock().expect("lock poisoned");
        mem::take(&mut *pending).into()
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let pending = self.pending.lock().expect("lock poisoned");
        pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new()
    }
}

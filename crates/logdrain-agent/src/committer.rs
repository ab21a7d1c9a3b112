// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic task draining the metric buffer into the store.

use std::sync::Arc;
use std::time::Duration;

use logdrain_store::MetricsStore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::buffer::MetricBuffer;

/// How often buffered records are flushed to the store.
pub const COMMIT_INTERVAL: Duration = Duration::from_secs(1);

pub struct BatchCommitter {
    buffer: Arc<MetricBuffer>,
    store: Arc<dyn MetricsStore>,
    period: Duration,
}

impl BatchCommitter {
    pub fn new(buffer: Arc<MetricBuffer>, store: Arc<dyn MetricsStore>) -> Self {
        Self::with_period(buffer, store, COMMIT_INTERVAL)
    }

    pub fn with_period(
        buffer: Arc<MetricBuffer>,
        store: Arc<dyn MetricsStore>,
        period: Duration,
    ) -> Self {
        Self {
            buffer,
            store,
            period,
        }
    }

    /// Runs commit cycles until cancelled, then commits whatever is still
    /// buffered so a clean shutdown does not drop the final cycle.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut commit_interval = interval(self.period);
        commit_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = commit_interval.tick() => self.commit_pending().await,
                _ = shutdown.cancelled() => {
                    self.commit_pending().await;
                    return;
                }
            }
        }
    }

    /// Drains the buffer and persists the batch as one bulk write. A failed
    /// batch is logged and discarded, never re-buffered or retried.
    pub async fn commit_pending(&self) {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return;
        }
        match self.store.insert_metrics(&batch).await {
            Ok(committed) => debug!("committed {committed} metric records"),
            Err(e) => error!(
                "failed to commit batch of {} records, discarding: {e}",
                batch.len()
            ),
        }
    }
}

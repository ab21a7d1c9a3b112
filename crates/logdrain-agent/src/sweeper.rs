// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic deletion of records past the retention horizon.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use logdrain_store::MetricsStore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Records older than this many hours are deleted.
pub const RETENTION_HOURS: i64 = 1;

pub struct RetentionSweeper {
    store: Arc<dyn MetricsStore>,
    period: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self::with_period(store, SWEEP_INTERVAL)
    }

    pub fn with_period(store: Arc<dyn MetricsStore>, period: Duration) -> Self {
        Self { store, period }
    }

    /// Sweeps once immediately on startup, then on every period until
    /// cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut sweep_interval = interval(self.period);

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => self.sweep().await,
                _ = shutdown.cancelled() => return,
            }
        }
    }

    /// One bulk delete of everything past the horizon. Failure is logged
    /// and left to the next scheduled sweep; the delete is idempotent.
    pub async fn sweep(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(RETENTION_HOURS);
        match self.store.delete_metrics_before(cutoff).await {
            Ok(deleted) => info!("{deleted} old metric records deleted"),
            Err(e) => error!("retention sweep failed: {e}"),
        }
    }
}

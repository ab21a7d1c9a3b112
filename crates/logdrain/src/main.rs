// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logdrain_agent::{
    buffer::MetricBuffer, committer::BatchCommitter, config, server::DrainServer,
    sweeper::RetentionSweeper,
};
use logdrain_store::{MetricsStore, PostgresStore};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,tokio_postgres=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config::Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on log drain startup: {e}");
            return;
        }
    };

    let store = Arc::new(PostgresStore::new(&config.database_url));
    if let Err(e) = store.ensure_schema().await {
        error!("Error preparing the metrics schema on log drain startup: {e}");
        return;
    }
    let store: Arc<dyn MetricsStore> = store;

    let buffer = Arc::new(MetricBuffer::new());
    let shutdown = CancellationToken::new();

    let committer = BatchCommitter::new(Arc::clone(&buffer), Arc::clone(&store));
    let committer_handle = tokio::spawn(committer.run(shutdown.clone()));

    let sweeper = RetentionSweeper::new(Arc::clone(&store));
    tokio::spawn(sweeper.run(shutdown.clone()));

    let server = DrainServer::new(config, Arc::clone(&buffer), Arc::clone(&store));
    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.start(server_shutdown).await {
            error!("Error when starting the log drain server: {e:?}");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = &mut server_handle => {
            error!("Server task terminated unexpectedly");
        }
    }

    shutdown.cancel();
    // The committer's shutdown path commits the final partial batch.
    let _ = committer_handle.await;
}

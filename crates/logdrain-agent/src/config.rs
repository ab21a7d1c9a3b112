// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB in Bytes

/// Process configuration, read from the environment once at startup.
#[derive(Debug)]
pub struct Config {
    /// Shared-secret path segment gating every route.
    pub token: String,
    /// Postgres connection string for the metrics store.
    pub database_url: String,
    /// TCP port the drain listens on.
    pub port: u16,
    /// Largest drain body accepted for parsing.
    pub max_body_bytes: usize,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let token = env::var("TOKEN")
            .map_err(|_| anyhow::anyhow!("TOKEN environment variable is not set"))?;
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is not set"))?;

        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Config {
            token,
            database_url,
            port,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }
}

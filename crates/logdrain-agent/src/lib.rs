// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Heroku log drain agent: line classification, metric buffering, the
//! periodic commit and retention tasks, and the HTTP surface serving the
//! drain and dashboard endpoints.

pub mod buffer;
pub mod classifier;
pub mod committer;
pub mod config;
pub mod dashboard;
pub mod http_utils;
pub mod server;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_store;

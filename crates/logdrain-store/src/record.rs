// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

/// Which log shape produced a metric record. Immutable once assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Router,
    Web,
    Postgres,
}

impl MetricKind {
    /// Value stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Router => "router",
            MetricKind::Web => "web",
            MetricKind::Postgres => "postgres",
        }
    }
}

/// Coarse feature area derived from a router request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathClass {
    Home,
    Search,
    Property,
    Results,
    View,
    /// Path matched no known prefix, or the line carried no path at all.
    None,
}

impl PathClass {
    /// The named classes. `None` marks the absence of a classification and
    /// is deliberately not part of this set.
    pub const KNOWN: [PathClass; 5] = [
        PathClass::Home,
        PathClass::Search,
        PathClass::Property,
        PathClass::Results,
        PathClass::View,
    ];

    /// Website page classes, as opposed to the API-backed ones.
    pub const FRONTEND: [PathClass; 3] =
        [PathClass::Home, PathClass::Search, PathClass::Property];

    /// Value stored in the `path` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            PathClass::Home => "home",
            PathClass::Search => "search",
            PathClass::Property => "property",
            PathClass::Results => "results",
            PathClass::View => "view",
            PathClass::None => "none",
        }
    }
}

/// The canonical unit of telemetry, one row in the metrics table.
///
/// The table is one wide schema shared by all three shapes; fields that do
/// not apply to a record's kind hold neutral defaults instead of nulls.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub kind: MetricKind,
    /// Event time from the log line, or ingestion time when unparseable.
    pub date: DateTime<Utc>,
    /// Dyno or database identifier (`web.2`, `DATABASE`); web and postgres.
    pub source: String,
    /// HTTP status code; router only.
    pub status: i32,
    /// Service time in milliseconds; router only.
    pub service: i32,
    /// Resident memory in MB; web only.
    pub memory: i32,
    /// Memory quota in MB; web only.
    pub memory_quota: i32,
    /// 15-minute load average; postgres only.
    pub load: f64,
    /// Request path class; router only.
    pub path: PathClass,
}

impl MetricRecord {
    /// A record of the given kind with every shape-specific field at its
    /// neutral default.
    pub fn new(kind: MetricKind, date: DateTime<Utc>) -> Self {
        MetricRecord {
            kind,
            date,
            source: String::new(),
            status: 0,
            service: 0,
            memory: 0,
            memory_quota: 0,
            load: 0.0,
            path: PathClass::None,
        }
    }
}

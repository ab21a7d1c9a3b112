// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::StatKind;

/// Bind parameters per inserted row; keep in sync with the column list
/// below and the parameter pushes in `PostgresStore::insert_metrics`.
pub(crate) const INSERT_PARAMS_PER_ROW: usize = 9;

// Runs on every startup, so it must stay idempotent.
pub(crate) const INIT_METRICS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metrics (
    id BIGSERIAL PRIMARY KEY,
    type TEXT NOT NULL,
    date TIMESTAMPTZ NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0,
    service INTEGER NOT NULL DEFAULT 0,
    memory INTEGER NOT NULL DEFAULT 0,
    memoryquota INTEGER NOT NULL DEFAULT 0,
    load DOUBLE PRECISION NOT NULL DEFAULT 0,
    path TEXT NOT NULL DEFAULT 'none'
);
CREATE INDEX IF NOT EXISTS metrics_type_date_idx ON metrics (type, date);
";

pub(crate) const DELETE_METRICS_BEFORE: &str = "DELETE FROM metrics WHERE date < $1";

/// Multi-row insert text: the column list plus `($1,...,$9),($10,...,$18),...`
/// for `rows` rows. Values are always bound, never spliced.
pub(crate) fn insert_metrics_sql(rows: usize) -> String {
    let mut sql = String::from(
        "INSERT INTO metrics \
         (type, date, source, status, service, memory, memoryquota, load, path) VALUES ",
    );
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        sql.push('(');
        for column in 0..INSERT_PARAMS_PER_ROW {
            if column > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("${}", row * INSERT_PARAMS_PER_ROW + column + 1));
        }
        sql.push(')');
    }
    sql
}

/// Grouped bucket query. Binds: `$1` metric type, `$2` window start,
/// `$3` bucket width in seconds, and `$4` the path class list when
/// `filter_classes` is set. Rows come back keyed by bucket index
/// `floor((date - start) / width)`; buckets nothing matched are simply
/// absent.
pub(crate) fn bucket_stats_sql(stat: StatKind, filter_classes: bool) -> String {
    let stat_expr = match stat {
        StatKind::ServiceMax => "MAX(service)::DOUBLE PRECISION",
        StatKind::MemoryAvg => "AVG(memory)::DOUBLE PRECISION",
        StatKind::RequestCount => "NULL::DOUBLE PRECISION",
    };
    let class_filter = if filter_classes {
        " AND path = ANY($4)"
    } else {
        ""
    };
    // Bucket attribution floors; an integer cast before the divide rounds.
    format!(
        "SELECT FLOOR(EXTRACT(EPOCH FROM (date - $2)) / $3)::BIGINT AS bucket, \
         COUNT(*) AS count, {stat_expr} AS stat \
         FROM metrics \
         WHERE type = $1 AND date >= $2{class_filter} \
         GROUP BY bucket ORDER BY bucket"
    )
}

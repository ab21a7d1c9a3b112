// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Classification of raw drain lines into typed metric records.
//!
//! Heroku delivers free-form syslog text with optional, reorderable tokens.
//! A line is first gated by an ordered list of substring rules (router, then
//! web, then postgres); the winning rule extracts its fields with independent
//! per-field patterns so a missing or mangled token degrades that one field
//! to its neutral default instead of failing the record.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use logdrain_store::{MetricKind, MetricRecord, PathClass};
use regex::Regex;

lazy_static! {
    /// First ISO-8601-like timestamp immediately followed by the word
    /// `host`, which is where Heroku places the event time.
    static ref DATE_REGEX: Regex =
        Regex::new(r"(\d{4}-\d{2}-\d{2}T\d{2}[\d:.+]*) host").expect("failed creating regex");
    static ref SERVICE_REGEX: Regex = Regex::new(r"service=(\d+)").expect("failed creating regex");
    static ref STATUS_REGEX: Regex = Regex::new(r"status=(\d+)").expect("failed creating regex");
    static ref PATH_REGEX: Regex = Regex::new(r#"path="(.+?)""#).expect("failed creating regex");
    static ref SOURCE_REGEX: Regex =
        Regex::new(r"source=([\w.-]+)").expect("failed creating regex");
    static ref MEMORY_TOTAL_REGEX: Regex =
        Regex::new(r"memory_total=(\d+)").expect("failed creating regex");
    static ref MEMORY_QUOTA_REGEX: Regex =
        Regex::new(r"memory_quota=(\d+)").expect("failed creating regex");
    static ref LOAD_AVG_REGEX: Regex =
        Regex::new(r"load-avg-15m=(\d+(?:\.\d+)?)").expect("failed creating regex");
}

/// One recognized log shape: the substrings that gate it and the extractor
/// that shapes the record once the gate passes.
struct ShapeRule {
    markers: [&'static str; 3],
    build: fn(&str, DateTime<Utc>) -> MetricRecord,
}

// Order matters: rules are evaluated top to bottom and the first rule whose
// markers are all present wins, even if a later rule would also match.
const SHAPE_RULES: [ShapeRule; 3] = [
    ShapeRule {
        markers: ["heroku router", "service=", "status="],
        build: router_record,
    },
    ShapeRule {
        markers: ["heroku web", "source=", "memory_total="],
        build: web_record,
    },
    ShapeRule {
        markers: ["heroku-postgres", "source=", "load-avg-15m="],
        build: postgres_record,
    },
];

/// Classifies a single drain line. Returns `None` when the line matches no
/// recognized shape; such lines are dropped without further processing.
pub fn classify_line(line: &str, ingested_at: DateTime<Utc>) -> Option<MetricRecord> {
    let rule = SHAPE_RULES
        .iter()
        .find(|rule| rule.markers.iter().all(|marker| line.contains(marker)))?;
    Some((rule.build)(line, event_time(line, ingested_at)))
}

fn router_record(line: &str, date: DateTime<Utc>) -> MetricRecord {
    let mut record = MetricRecord::new(MetricKind::Router, date);
    record.service = capture_i32(&SERVICE_REGEX, line);
    record.status = capture_i32(&STATUS_REGEX, line);
    record.path = capture(&PATH_REGEX, line).map_or(PathClass::None, classify_path);
    record
}

fn web_record(line: &str, date: DateTime<Utc>) -> MetricRecord {
    let mut record = MetricRecord::new(MetricKind::Web, date);
    record.source = capture(&SOURCE_REGEX, line).unwrap_or_default().to_string();
    record.memory = capture_i32(&MEMORY_TOTAL_REGEX, line);
    record.memory_quota = capture_i32(&MEMORY_QUOTA_REGEX, line);
    record
}

fn postgres_record(line: &str, date: DateTime<Utc>) -> MetricRecord {
    let mut record = MetricRecord::new(MetricKind::Postgres, date);
    record.source = capture(&SOURCE_REGEX, line).unwrap_or_default().to_string();
    record.load = capture_f64(&LOAD_AVG_REGEX, line);
    record
}

/// Event time from the line, or the ingestion time when the line carries no
/// parseable timestamp.
fn event_time(line: &str, ingested_at: DateTime<Utc>) -> DateTime<Utc> {
    capture(&DATE_REGEX, line)
        .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(ingested_at)
}

fn capture<'l>(regex: &Regex, line: &'l str) -> Option<&'l str> {
    regex
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|group| group.as_str())
}

fn capture_i32(regex: &Regex, line: &str) -> i32 {
    capture(regex, line)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn capture_f64(regex: &Regex, line: &str) -> f64 {
    capture(regex, line)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0)
}

fn is_home(path: &str) -> bool {
    matches!(path, "" | "/" | "/ar" | "/ar/")
}

fn is_property(path: &str) -> bool {
    path.starts_with("/property/") || path.starts_with("/ar/property/")
}

fn is_search(path: &str) -> bool {
    ["/to-rent/", "/for-sale/", "/ar/to-rent/", "/ar/for-sale/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn is_results(path: &str) -> bool {
    path.starts_with("/api/areaguide/")
}

fn is_view(path: &str) -> bool {
    path.starts_with("/api/listing/")
}

// Same first-match-wins contract as SHAPE_RULES.
const PATH_RULES: [(fn(&str) -> bool, PathClass); 5] = [
    (is_home, PathClass::Home),
    (is_property, PathClass::Property),
    (is_search, PathClass::Search),
    (is_results, PathClass::Results),
    (is_view, PathClass::View),
];

/// Maps a request path onto its dashboard category. Total over all strings:
/// paths outside the known prefixes map to [`PathClass::None`].
pub fn classify_path(path: &str) -> PathClass {
    PATH_RULES
        .iter()
        .find(|(matches, _)| matches(path))
        .map_or(PathClass::None, |(_, class)| *class)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use duplicate::duplicate_item;
    use logdrain_store::{MetricKind, PathClass};
    use proptest::prelude::*;

    use super::{classify_line, classify_path};

    const ROUTER_LINE: &str = "2016-06-09T07:32:15.360608+00:00 app[web.1]: 239 <158>1 \
        2016-06-09T07:32:14.500838+00:00 host heroku router - at=info method=POST \
        path=\"/login\" host=app.example.com request_id=7f4e29d2-e2f1-42d0-b47b-9150b2b1183a \
        fwd=\"46.246.28.90\" dyno=web.2 connect=1ms service=129ms status=200 bytes=5016";

    const WEB_LINE: &str = "2016-06-09T07:32:16.527056+00:00 app[web.1]: 339 <45>1 \
        2016-06-09T07:32:16.163266+00:00 host heroku web.2 - source=web.2 \
        dyno=heroku.32934028.9646d93e-977a-421a-a5ef-02adc583e5b5 \
        sample#memory_total=247.22MB sample#memory_rss=204.91MB sample#memory_cache=41.48MB \
        sample#memory_swap=0.82MB sample#memory_pgpgin=2377742pages \
        sample#memory_pgpgout=2339192pages sample#memory_quota=1024.00MB";

    const POSTGRES_LINE: &str = "2016-06-09T07:53:07.315320+00:00 app[web.1]: 531 <134>1 \
        2016-06-09T07:52:53+00:00 host app heroku-postgres - source=DATABASE \
        sample#current_transaction=48441 sample#db_size=247529644.0bytes sample#tables=28 \
        sample#active-connections=3 sample#load-avg-1m=0.055 sample#load-avg-5m=0.035 \
        sample#load-avg-15m=0.025 sample#read-iops=0 sample#write-iops=0.29701";

    #[test]
    fn test_router_line_yields_router_record() {
        let record = classify_line(ROUTER_LINE, Utc::now()).unwrap();
        assert_eq!(record.kind, MetricKind::Router);
        assert_eq!(record.service, 129);
        assert_eq!(record.status, 200);
        assert_eq!(record.path, PathClass::None);
        assert_eq!(
            record.date,
            Utc.with_ymd_and_hms(2016, 6, 9, 7, 32, 14).unwrap()
                + chrono::Duration::microseconds(500_838)
        );
        assert_eq!(record.source, "");
        assert_eq!(record.memory, 0);
        assert_eq!(record.memory_quota, 0);
        assert_eq!(record.load, 0.0);
    }

    #[test]
    fn test_web_line_yields_web_record() {
        let record = classify_line(WEB_LINE, Utc::now()).unwrap();
        assert_eq!(record.kind, MetricKind::Web);
        assert_eq!(record.source, "web.2");
        assert_eq!(record.memory, 247);
        assert_eq!(record.memory_quota, 1024);
        assert_eq!(record.service, 0);
        assert_eq!(record.status, 0);
        assert_eq!(record.path, PathClass::None);
    }

    #[test]
    fn test_postgres_line_yields_postgres_record() {
        let record = classify_line(POSTGRES_LINE, Utc::now()).unwrap();
        assert_eq!(record.kind, MetricKind::Postgres);
        assert_eq!(record.source, "DATABASE");
        assert_eq!(record.load, 0.025);
        assert_eq!(
            record.date,
            Utc.with_ymd_and_hms(2016, 6, 9, 7, 52, 53).unwrap()
        );
    }

    #[test]
    fn test_router_rule_wins_over_later_shapes() {
        // Carries every marker of every shape; the router rule is evaluated
        // first and must win.
        let line = "host heroku router heroku web heroku-postgres service=5ms status=503 \
            source=web.1 memory_total=100MB load-avg-15m=0.5";
        let record = classify_line(line, Utc::now()).unwrap();
        assert_eq!(record.kind, MetricKind::Router);
        assert_eq!(record.service, 5);
        assert_eq!(record.status, 503);
    }

    #[test]
    fn test_unrecognized_line_yields_nothing() {
        assert!(classify_line("", Utc::now()).is_none());
        assert!(classify_line("heroku router at=info", Utc::now()).is_none());
        let app_line = "2016-06-09T07:32:15+00:00 app[web.1]: GET /health 200";
        assert!(classify_line(app_line, Utc::now()).is_none());
    }

    #[test]
    fn test_malformed_fields_default_to_zero() {
        let line = "host heroku router - at=info service=fast status=teapot";
        let record = classify_line(line, Utc::now()).unwrap();
        assert_eq!(record.kind, MetricKind::Router);
        assert_eq!(record.service, 0);
        assert_eq!(record.status, 0);
        assert_eq!(record.path, PathClass::None);
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_ingestion_time() {
        let ingested_at = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let line = "heroku router - at=info path=\"/\" service=10ms status=200";
        let record = classify_line(line, ingested_at).unwrap();
        assert_eq!(record.date, ingested_at);
    }

    #[test]
    fn test_timestamp_without_host_marker_is_ignored() {
        let ingested_at = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        // Timestamp is present but never followed by ` host`.
        let line = "2016-06-09T07:32:14+00:00 heroku router service=10ms status=200";
        let record = classify_line(line, ingested_at).unwrap();
        assert_eq!(record.date, ingested_at);
    }

    #[test]
    fn test_integer_truncation_of_sampled_megabytes() {
        let line = "host heroku web source=web.1 sample#memory_total=512.99MB \
            sample#memory_quota=2048.50MB";
        let record = classify_line(line, Utc::now()).unwrap();
        assert_eq!(record.memory, 512);
        assert_eq!(record.memory_quota, 2048);
    }

    #[duplicate_item(
        test_name                       input                       expected;
        [test_path_empty]               [""]                        [PathClass::Home];
        [test_path_root]                ["/"]                       [PathClass::Home];
        [test_path_ar]                  ["/ar"]                     [PathClass::Home];
        [test_path_ar_root]             ["/ar/"]                    [PathClass::Home];
        [test_path_property]            ["/property/123"]           [PathClass::Property];
        [test_path_ar_property]         ["/ar/property/9"]          [PathClass::Property];
        [test_path_to_rent]             ["/to-rent/london"]         [PathClass::Search];
        [test_path_for_sale]            ["/for-sale/leeds"]         [PathClass::Search];
        [test_path_ar_to_rent]          ["/ar/to-rent/york"]        [PathClass::Search];
        [test_path_ar_for_sale]         ["/ar/for-sale/bath"]       [PathClass::Search];
        [test_path_areaguide]           ["/api/areaguide/oxford"]   [PathClass::Results];
        [test_path_listing]             ["/api/listing/55"]         [PathClass::View];
        [test_path_unknown]             ["/unknown/x"]              [PathClass::None];
        [test_path_login]               ["/login"]                  [PathClass::None];
        [test_path_property_no_slash]   ["/property"]               [PathClass::None];
    )]
    #[test]
    fn test_name() {
        assert_eq!(classify_path(input), expected);
    }

    proptest! {
        #![proptest_config(
            ProptestConfig { failure_persistence: None, ..ProptestConfig::default() }
        )]

        #[test]
        fn test_classify_path_is_total(path in ".*") {
            // Must never panic and must always land in the known enum.
            let class = classify_path(&path);
            prop_assert!(PathClass::KNOWN.contains(&class) || class == PathClass::None);
        }

        #[test]
        fn test_classify_line_never_panics(line in ".*") {
            let _ = classify_line(&line, Utc::now());
        }
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::Full;
use hyper::{
    body::Bytes,
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use serde_json::Value;

/// Content type Heroku attaches to drain deliveries.
pub const LOGPLEX_CONTENT_TYPE: &str = "application/logplex-1";

pub type HttpResponse = Response<Full<Bytes>>;

/// Response with the given status and an empty body.
pub fn empty_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder().status(status).body(Full::default())
}

/// 200 response carrying a JSON document.
pub fn json_response(body: &Value) -> http::Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::from(body.to_string()))
}

/// Whether the request declares the logplex drain content type. Parameters
/// after `;` are ignored and the comparison is case-insensitive, matching
/// how upstream shippers vary the header.
pub fn is_logplex(header_map: &HeaderMap) -> bool {
    let media_type = header_map
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim);
    media_type.is_some_and(|media| media.eq_ignore_ascii_case(LOGPLEX_CONTENT_TYPE))
}

/// Whether the declared content length exceeds `max_bytes`. A missing or
/// unparseable header passes; the cap is enforced again while the body is
/// read.
pub fn content_length_exceeds(header_map: &HeaderMap, max_bytes: usize) -> bool {
    header_map
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_some_and(|length| length > max_bytes)
}

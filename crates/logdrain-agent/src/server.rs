// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of the drain: the ingestion endpoint, the dashboard query
//! endpoints, and the accept loop serving them.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use http_body_util::{BodyExt, Limited};
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use logdrain_store::{MetricsStore, PathClass, StoreError};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::buffer::MetricBuffer;
use crate::classifier::classify_line;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::http_utils::{
    content_length_exceeds, empty_response, is_logplex, json_response, HttpResponse,
};

pub struct DrainServer {
    config: Arc<Config>,
    buffer: Arc<MetricBuffer>,
    dashboard: Arc<Dashboard>,
}

impl DrainServer {
    pub fn new(config: Config, buffer: Arc<MetricBuffer>, store: Arc<dyn MetricsStore>) -> Self {
        Self {
            config: Arc::new(config),
            buffer,
            dashboard: Arc::new(Dashboard::new(store)),
        }
    }

    /// Binds the listener and serves requests until `shutdown` fires.
    pub async fn start(
        self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(&addr).await?;
        info!("log drain listening on port {}", self.config.port);

        let config = Arc::clone(&self.config);
        let buffer = Arc::clone(&self.buffer);
        let dashboard = Arc::clone(&self.dashboard);
        let service = service_fn(move |req| {
            // called for each http request
            let config = Arc::clone(&config);
            let buffer = Arc::clone(&buffer);
            let dashboard = Arc::clone(&dashboard);

            Self::handle_request(config, buffer, dashboard, req)
        });

        Self::serve_tcp(listener, service, shutdown).await
    }

    async fn serve_tcp<S>(
        listener: TcpListener,
        service: S,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        S: hyper::service::Service<Request<hyper::body::Incoming>, Response = HttpResponse>
            + Clone
            + Send
            + 'static,
        S::Future: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill server on panic - log and continue
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                () = shutdown.cancelled() => return Ok(()),
            };
            let conn = TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }
    }

    async fn handle_request<B>(
        config: Arc<Config>,
        buffer: Arc<MetricBuffer>,
        dashboard: Arc<Dashboard>,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: hyper::body::Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (&method, segments.as_slice()) {
            (&Method::POST, ["drain", token]) if *token == config.token => {
                Self::ingest_drain(&config, &buffer, req).await
            }
            (&Method::GET, ["service", class, token]) if *token == config.token => {
                let class = match *class {
                    "home" => PathClass::Home,
                    "search" => PathClass::Search,
                    "property" => PathClass::Property,
                    _ => return Self::not_found(),
                };
                Self::dashboard_response(dashboard.service_series(class, Utc::now()).await)
            }
            (&Method::GET, ["throughput", token]) if *token == config.token => {
                Self::dashboard_response(dashboard.throughput_series(None, Utc::now()).await)
            }
            (&Method::GET, ["throughput", group, token]) if *token == config.token => {
                let classes: &[PathClass] = match *group {
                    "frontend" => &PathClass::FRONTEND,
                    "results" => &[PathClass::Results],
                    "view" => &[PathClass::View],
                    _ => return Self::not_found(),
                };
                Self::dashboard_response(
                    dashboard.throughput_series(Some(classes), Utc::now()).await,
                )
            }
            (&Method::GET, ["memory", token]) if *token == config.token => {
                Self::dashboard_response(dashboard.memory_series(Utc::now()).await)
            }
            _ => Self::not_found(),
        }
    }

    /// Reads the delivery up to the configured cap, responds `200`, and
    /// leaves classification to a detached task. The shipper must never see
    /// a failure status for an application-level parsing problem, or it
    /// would back off.
    async fn ingest_drain<B>(
        config: &Config,
        buffer: &Arc<MetricBuffer>,
        req: Request<B>,
    ) -> http::Result<HttpResponse>
    where
        B: hyper::body::Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        if !is_logplex(&parts.headers) {
            debug!("ignoring drain delivery without logplex content type");
            return empty_response(StatusCode::OK);
        }
        if content_length_exceeds(&parts.headers, config.max_body_bytes) {
            error!("drain delivery over the body limit, dropping");
            return empty_response(StatusCode::OK);
        }

        // Limited aborts the read the moment the cap is crossed, so a
        // delivery that never declared its length cannot grow the buffer
        // past the cap either.
        match Limited::new(body, config.max_body_bytes).collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.is_empty() {
                    error!("no log line parsed");
                } else {
                    let buffer = Arc::clone(buffer);
                    tokio::spawn(async move {
                        let ingested_at = Utc::now();
                        let line = String::from_utf8_lossy(&bytes);
                        match classify_line(&line, ingested_at) {
                            Some(record) => buffer.append(record),
                            None => debug!("drain delivery matched no metric shape"),
                        }
                    });
                }
            }
            Err(e) => error!("failed to read drain body: {e}"),
        }

        empty_response(StatusCode::OK)
    }

    fn dashboard_response(result: Result<Value, StoreError>) -> http::Result<HttpResponse> {
        match result {
            Ok(body) => json_response(&body),
            Err(_) => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn not_found() -> http::Result<HttpResponse> {
        let mut not_found = Response::default();
        *not_found.status_mut() = StatusCode::NOT_FOUND;
        Ok(not_found)
    }
}

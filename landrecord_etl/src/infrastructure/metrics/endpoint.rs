// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Scrape Endpoint
//!
//! Minimal HTTP server exposing the Prometheus registry. Serves the
//! Prometheus text exposition on `GET /metrics`, a liveness JSON document
//! on `GET /health`, and 404 for anything else.
//!
//! One Tokio task per connection; a deliberately tiny request parser since
//! the only clients are Prometheus scrapers and load balancers.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use landrecord_etl_domain::EtlError;

use super::service::EtlMetricsService;

/// Default scrape port when `ETL_METRICS_PORT` is unset.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// HTTP endpoint serving `/metrics` and `/health`.
pub struct MetricsEndpoint {
    metrics: Arc<EtlMetricsService>,
    port: u16,
}

impl MetricsEndpoint {
    pub fn new(metrics: Arc<EtlMetricsService>, port: u16) -> Self {
        Self { metrics, port }
    }

    /// Reads the port from `ETL_METRICS_PORT`, falling back to 9090.
    pub fn from_env(metrics: Arc<EtlMetricsService>) -> Self {
        let port = std::env::var("ETL_METRICS_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_METRICS_PORT);
        Self::new(metrics, port)
    }

    /// Binds and serves forever. Individual connection errors are logged
    /// and do not stop the listener.
    pub async fn start(&self) -> Result<(), EtlError> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| EtlError::internal_error(format!("Failed to bind metrics endpoint: {}", e)))?;

        info!("Prometheus metrics endpoint started on http://{}/metrics", addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(&mut stream, metrics).await {
                            error!("Error handling metrics request: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Routes one request to `/metrics`, `/health` or 404.
async fn handle_request(
    stream: &mut TcpStream,
    metrics: Arc<EtlMetricsService>,
) -> Result<(), EtlError> {
    let mut buffer = [0u8; 1024];
    let read = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..read]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let response = match path {
        "/metrics" => match metrics.gather() {
            Ok(body) => http_response(
                "200 OK",
                "text/plain; version=0.0.4; charset=utf-8",
                &body,
            ),
            Err(e) => http_response("500 Internal Server Error", "text/plain", &e.to_string()),
        },
        "/health" => http_response(
            "200 OK",
            "application/json",
            "{\"status\":\"ok\",\"service\":\"landrecord-etl\"}",
        ),
        _ => http_response("404 Not Found", "text/plain", "not found"),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

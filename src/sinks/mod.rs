use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, StatusCode};

use crate::config::data_model::{OutputConfig, SinkKind};
use crate::errors::SinkError;
use crate::parser::ParsedResponse;

pub mod elasticsearch;
pub mod influxdb;

pub use elasticsearch::ElasticsearchSink;
pub use influxdb::InfluxdbSink;

/// A batched upload backend.
///
/// `upload` maps the whole argument into one outbound request. Transient
/// failures (5xx, transport timeouts) come back as `SinkError::Retryable`,
/// permanent ones as `SinkError::Permanent`; neither is re-raised as a
/// panic and neither aborts peer sinks.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, records: &[ParsedResponse]) -> Result<(), SinkError>;
}

/// Construct every configured sink.
pub fn build_sinks(outputs: &[OutputConfig]) -> Vec<Arc<dyn Sink>> {
    outputs
        .iter()
        .map(|output| match output.kind {
            SinkKind::Elasticsearch => {
                Arc::new(ElasticsearchSink::new(output)) as Arc<dyn Sink>
            }
            SinkKind::Influxdb | SinkKind::Influxdbv2 => {
                Arc::new(InfluxdbSink::new(output)) as Arc<dyn Sink>
            }
        })
        .collect()
}

/// Outbound request deadline; matches the bulk endpoint's own timeout.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Only this much of an error response body makes it into the logs.
pub(crate) const ERROR_BODY_LIMIT: usize = 1024;

pub(crate) fn log_body(body: &str) -> &str {
    &body[..body.len().min(ERROR_BODY_LIMIT)]
}

pub(crate) fn gzip(body: &[u8]) -> Result<Vec<u8>, SinkError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body)
        .and_then(|_| encoder.finish())
        .map_err(|e| SinkError::Permanent(format!("gzip compression failed: {e}")))
}

pub(crate) fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

/// Issue a request and hand back status plus body.
///
/// Transport errors and timeouts are the 599 class and always retryable;
/// HTTP status classification is up to the caller.
pub(crate) async fn send_request(
    client: &Client<HttpConnector>,
    request: Request<Body>,
) -> Result<(StatusCode, String), SinkError> {
    let url = request.uri().to_string();

    let response = match tokio::time::timeout(REQUEST_TIMEOUT, client.request(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            return Err(SinkError::Retryable(format!("{url}: transport error: {e}")));
        }
        Err(_) => {
            return Err(SinkError::Retryable(format!(
                "{url}: request timed out after {}s",
                REQUEST_TIMEOUT.as_secs()
            )));
        }
    };

    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .unwrap_or_default();
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

use std::collections::HashSet;

use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Method, Request, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{basic_auth_header, gzip, log_body, send_request, Sink};
use crate::config::data_model::{OutputConfig, SinkAuth};
use crate::errors::SinkError;
use crate::parser::ParsedResponse;
use crate::path::{index_from_yang_path, today_date};

const INDEX_MAPPING: &str =
    r#"{"mappings": {"properties": {"@timestamp": {"type": "date"}}}}"#;

/// Bulk uploader for an Elasticsearch-style search index.
///
/// Index names derive from each record's yang path plus the current date.
/// The sink remembers which indices it has created; an unseen one is
/// created with a `@timestamp` date mapping before the bulk request goes
/// out. Creation serializes on a mutex so concurrent workers cannot race
/// the PUT.
pub struct ElasticsearchSink {
    name: String,
    base_url: String,
    client: Client<HttpConnector>,
    auth_header: Option<String>,
    known_indices: Mutex<HashSet<String>>,
}

impl ElasticsearchSink {
    pub fn new(config: &OutputConfig) -> Self {
        let auth_header = match &config.auth {
            SinkAuth::Basic { username, password } => {
                Some(basic_auth_header(username, password))
            }
            _ => None,
        };

        Self {
            name: config.name.clone(),
            base_url: format!("http://{}:{}", config.address, config.port),
            client: Client::new(),
            auth_header,
            known_indices: Mutex::new(HashSet::new()),
        }
    }

    /// Render the ndjson bulk payload for a batch.
    pub fn bulk_body(records: &[ParsedResponse], date: &str) -> String {
        let mut lines = String::new();
        for record in records {
            let index = index_from_yang_path(&record.yang_path, date);
            let action = json!({"index": {"_index": index}});
            lines.push_str(&action.to_string());
            lines.push('\n');
            lines.push_str(&Self::document(record).to_string());
            lines.push('\n');
        }
        lines
    }

    /// Render one record as its bulk document, keys and content merged at
    /// the top level.
    pub fn document(record: &ParsedResponse) -> Value {
        let mut doc = Map::new();
        for (key, value) in &record.keys {
            doc.insert(key.clone(), value.clone());
        }
        for (key, value) in &record.content {
            doc.insert(key.clone(), value.clone());
        }
        doc.insert(
            "hostname".to_string(),
            Value::String(record.hostname.clone()),
        );
        doc.insert("version".to_string(), Value::String(record.version.clone()));
        doc.insert(
            "yang_path".to_string(),
            Value::String(record.yang_path.clone()),
        );
        // The index mapping types @timestamp as a date in milliseconds.
        doc.insert(
            "@timestamp".to_string(),
            Value::from(record.timestamp_ns / 1_000_000),
        );
        Value::Object(doc)
    }

    fn request(&self, method: Method, url: &str) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(url);
        if let Some(auth) = &self.auth_header {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder
    }

    /// List existing indices, skipping the `.`-prefixed system ones.
    async fn fetch_indices(&self) -> Result<Vec<String>, SinkError> {
        let url = format!("{}/*", self.base_url);
        let request = self
            .request(Method::GET, &url)
            .body(Body::empty())
            .map_err(|e| SinkError::Permanent(format!("failed to build request: {e}")))?;

        let (status, body) = send_request(&self.client, request).await?;
        if status.is_server_error() {
            error!(sink = %self.name, %url, %status, body = log_body(&body),
                "index listing failed");
            return Err(SinkError::Retryable(format!("{url}: status {status}")));
        }
        if !status.is_success() {
            error!(sink = %self.name, %url, %status, body = log_body(&body),
                "index listing failed");
            return Err(SinkError::Permanent(format!("{url}: status {status}")));
        }

        let listing: Map<String, Value> = serde_json::from_str(&body)
            .map_err(|e| SinkError::Permanent(format!("{url}: invalid index listing: {e}")))?;
        Ok(listing
            .keys()
            .filter(|name| !name.starts_with('.'))
            .cloned()
            .collect())
    }

    async fn put_index(&self, index: &str) -> Result<(), SinkError> {
        let url = format!("{}/{}", self.base_url, index);
        let request = self
            .request(Method::PUT, &url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(INDEX_MAPPING))
            .map_err(|e| SinkError::Permanent(format!("failed to build request: {e}")))?;

        let (status, body) = send_request(&self.client, request).await?;
        if status.is_success() {
            info!(sink = %self.name, %index, "created index");
            return Ok(());
        }
        // A racing creator already made it; 400 reports the conflict.
        if status == StatusCode::BAD_REQUEST {
            debug!(sink = %self.name, %index, body = log_body(&body),
                "index already exists");
            return Ok(());
        }
        error!(sink = %self.name, %url, %status, body = log_body(&body),
            "index creation failed");
        if status.is_server_error() {
            Err(SinkError::Retryable(format!("{url}: status {status}")))
        } else {
            Err(SinkError::Permanent(format!("{url}: status {status}")))
        }
    }

    /// Create `index` unless this process already knows it exists.
    async fn ensure_index(&self, index: &str) -> Result<(), SinkError> {
        {
            let known = self.known_indices.lock().await;
            if known.contains(index) {
                return Ok(());
            }
        }

        // Serialize creators; re-check under the lock.
        let mut known = self.known_indices.lock().await;
        if known.contains(index) {
            return Ok(());
        }
        if known.is_empty() {
            for existing in self.fetch_indices().await? {
                known.insert(existing);
            }
            if known.contains(index) {
                return Ok(());
            }
        }
        self.put_index(index).await?;
        known.insert(index.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for ElasticsearchSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, records: &[ParsedResponse]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let date = today_date();
        let mut indices = HashSet::new();
        for record in records {
            indices.insert(index_from_yang_path(&record.yang_path, &date));
        }
        for index in &indices {
            self.ensure_index(index).await?;
        }

        let body = Self::bulk_body(records, &date);
        let compressed = gzip(body.as_bytes())?;

        let url = format!("{}/_bulk?timeout=120s", self.base_url);
        let request = self
            .request(Method::POST, &url)
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(Body::from(compressed))
            .map_err(|e| SinkError::Permanent(format!("failed to build request: {e}")))?;

        let (status, response_body) = send_request(&self.client, request).await?;
        if status.is_success() {
            debug!(sink = %self.name, records = records.len(), "bulk upload complete");
            return Ok(());
        }

        error!(sink = %self.name, %url, %status, body = log_body(&response_body),
            "bulk upload failed");
        if status.is_server_error() {
            Err(SinkError::Retryable(format!("{url}: status {status}")))
        } else {
            Err(SinkError::Permanent(format!("{url}: status {status}")))
        }
    }
}

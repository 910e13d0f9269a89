use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Method, Request};
use serde_json::Value;
use tracing::{debug, error};

use super::{basic_auth_header, gzip, log_body, send_request, Sink};
use crate::config::data_model::{OutputConfig, SinkAuth};
use crate::errors::SinkError;
use crate::parser::ParsedResponse;

/// Line-protocol uploader for an InfluxDB-style time-series store.
///
/// Each record becomes one `<yang_path>,<tags> <fields> <timestamp>` line.
/// Tags are the record's list keys plus encoding/hostname/ip/version;
/// fields are the content leaves. A per-batch increment on the timestamp
/// keeps otherwise-identical lines from colliding inside one request.
pub struct InfluxdbSink {
    name: String,
    write_url: String,
    client: Client<HttpConnector>,
    auth_header: Option<String>,
}

impl InfluxdbSink {
    pub fn new(config: &OutputConfig) -> Self {
        let bucket = config.database.clone().unwrap_or_default();
        let mut write_url = format!(
            "http://{}:{}/api/v2/write?precision=ns&bucket={}",
            config.address, config.port, bucket
        );
        if let Some(org) = &config.org {
            write_url.push_str("&org=");
            write_url.push_str(org);
        }

        let auth_header = match &config.auth {
            SinkAuth::Basic { username, password } => {
                Some(basic_auth_header(username, password))
            }
            SinkAuth::Token { token } => Some(format!("Token {token}")),
            SinkAuth::None => None,
        };

        Self {
            name: config.name.clone(),
            write_url,
            client: Client::new(),
            auth_header,
        }
    }

    /// Render a whole batch, one line per record.
    pub fn lines(records: &[ParsedResponse]) -> Vec<String> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| Self::line(record, i as i64))
            .collect()
    }

    /// Render one record; `offset` is the batch deduplication increment.
    pub fn line(record: &ParsedResponse, offset: i64) -> String {
        let mut tags: Vec<(String, String)> = Vec::new();
        for (key, value) in &record.keys {
            tags.push((key.clone(), tag_value(value)));
        }
        tags.push(("encoding".to_string(), tag_text(&record.encoding)));
        tags.push(("hostname".to_string(), tag_text(&record.hostname)));
        tags.push(("ip".to_string(), tag_text(&record.ip)));
        tags.push(("version".to_string(), tag_text(&record.version)));

        let mut fields: Vec<String> = Vec::new();
        for (key, value) in &record.content {
            match value {
                Value::String(s) => {
                    let escaped = escape_string(s);
                    if escaped.is_empty() {
                        // An empty tag value is illegal; promote the empty
                        // field as a literal `key=""` tag instead.
                        tags.push((key.clone(), "\"\"".to_string()));
                    }
                    fields.push(format!("{key}=\"{escaped}\""));
                }
                Value::Bool(b) => fields.push(format!("{key}={b}")),
                Value::Number(n) => fields.push(format!("{key}={n}")),
                other => {
                    let rendered = escape_string(&other.to_string());
                    fields.push(format!("{key}=\"{rendered}\""));
                }
            }
        }

        let tag_set = tags
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{},{} {} {}",
            record.yang_path,
            tag_set,
            fields.join(","),
            record.timestamp_ns + offset
        )
    }
}

fn tag_value(value: &Value) -> String {
    match value {
        Value::String(s) => tag_text(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => tag_text(&other.to_string()),
    }
}

fn tag_text(raw: &str) -> String {
    let escaped = escape_string(raw);
    if escaped.is_empty() {
        "\"\"".to_string()
    } else {
        escaped
    }
}

/// Collapse whitespace runs, escape `,` and `=`, strip `"`.
fn escape_string(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut escaped = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        match c {
            ',' => escaped.push_str("\\,"),
            '=' => escaped.push_str("\\="),
            '"' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

#[async_trait::async_trait]
impl Sink for InfluxdbSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, records: &[ParsedResponse]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let body = Self::lines(records).join("\n");
        let compressed = gzip(body.as_bytes())?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(&self.write_url)
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::CONTENT_TYPE, "text/plain");
        if let Some(auth) = &self.auth_header {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = builder
            .body(Body::from(compressed))
            .map_err(|e| SinkError::Permanent(format!("failed to build request: {e}")))?;

        let (status, response_body) = send_request(&self.client, request).await?;
        if status.is_success() {
            debug!(sink = %self.name, records = records.len(), "write complete");
            return Ok(());
        }

        error!(sink = %self.name, url = %self.write_url, %status,
            body = log_body(&response_body), "write failed");
        if status.is_server_error() {
            Err(SinkError::Retryable(format!(
                "{}: status {status}",
                self.write_url
            )))
        } else {
            Err(SinkError::Permanent(format!(
                "{}: status {status}",
                self.write_url
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record() -> ParsedResponse {
        let mut keys = Map::new();
        keys.insert("name".to_string(), Value::String("Gi0/0".to_string()));
        let mut content = Map::new();
        content.insert("in-octets".to_string(), Value::from(1200));
        ParsedResponse {
            yang_path: "openconfig-interfaces:interfaces/interface/state".to_string(),
            encoding: "gnmi".to_string(),
            hostname: "core-1".to_string(),
            version: "7.3.1".to_string(),
            ip: "10.0.0.1".to_string(),
            timestamp_ns: 1_700_000_000_000_000_000,
            keys,
            content,
        }
    }

    #[test]
    fn renders_tags_and_fields() {
        let line = InfluxdbSink::line(&record(), 0);
        assert_eq!(
            line,
            "openconfig-interfaces:interfaces/interface/state,\
             name=Gi0/0,encoding=gnmi,hostname=core-1,ip=10.0.0.1,version=7.3.1 \
             in-octets=1200 1700000000000000000"
        );
    }

    #[test]
    fn batch_offset_deduplicates_timestamps() {
        let records = vec![record(), record()];
        let lines = InfluxdbSink::lines(&records);
        assert!(lines[0].ends_with("1700000000000000000"));
        assert!(lines[1].ends_with("1700000000000000001"));
    }

    #[test]
    fn escapes_and_collapses_strings() {
        assert_eq!(escape_string("a,b=c"), "a\\,b\\=c");
        assert_eq!(escape_string("  spaced \t out "), "spaced out");
        assert_eq!(escape_string("\"quoted\""), "quoted");
    }

    #[test]
    fn empty_string_field_promotes_to_tag() {
        let mut rec = record();
        rec.content
            .insert("description".to_string(), Value::String(String::new()));
        let line = InfluxdbSink::line(&rec, 0);
        assert!(line.contains("description=\"\","));
        assert!(line.contains("description=\"\" ") || line.contains(",description=\"\""));
    }
}

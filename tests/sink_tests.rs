use pretty_assertions::assert_eq;
use serde_json::{Map, Value};

use mdtrelay::parser::ParsedResponse;
use mdtrelay::sinks::{ElasticsearchSink, InfluxdbSink};

const DATE: &str = "2026.08.01";

fn record(yang_path: &str, leaf: &str, value: Value) -> ParsedResponse {
    let mut keys = Map::new();
    keys.insert("name".to_string(), Value::from("Gi0"));
    let mut content = Map::new();
    content.insert(leaf.to_string(), value);
    ParsedResponse {
        yang_path: yang_path.to_string(),
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
fn bulk_body_pairs_action_and_document_lines() {
    let records = vec![
        record("a:b/c", "oper-status", Value::from("UP")),
        record("a:b/d", "in-octets", Value::from(42)),
    ];

    let body = ElasticsearchSink::bulk_body(&records, DATE);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 4);

    let action: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(action["index"]["_index"], format!("a-b-c-{DATE}"));

    let doc: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(doc["hostname"], "core-1");
    assert_eq!(doc["version"], "7.3.1");
    assert_eq!(doc["yang_path"], "a:b/c");
    // keys and content merged at the top of the document
    assert_eq!(doc["name"], "Gi0");
    assert_eq!(doc["oper-status"], "UP");
    // nanoseconds scaled down to the date mapping's milliseconds
    assert_eq!(doc["@timestamp"], 1_700_000_000_000i64);

    assert!(body.ends_with('\n'));
}

#[test]
fn document_prefers_content_over_keys_on_collision() {
    let mut rec = record("a:b/c", "name", Value::from("content-side"));
    rec.keys
        .insert("name".to_string(), Value::from("key-side"));

    let doc = ElasticsearchSink::document(&rec);
    assert_eq!(doc["name"], "content-side");
}

#[test]
fn influx_line_carries_metadata_tags() {
    let rec = record("a:b/c", "in-octets", Value::from(42));
    let line = InfluxdbSink::line(&rec, 0);
    assert!(line.starts_with("a:b/c,"));
    assert!(line.contains("encoding=gnmi"));
    assert!(line.contains("hostname=core-1"));
    assert!(line.contains("ip=10.0.0.1"));
    assert!(line.contains("version=7.3.1"));
    assert!(line.contains("name=Gi0"));
    assert!(line.ends_with(" in-octets=42 1700000000000000000"));
}

#[test]
fn influx_escapes_tag_and_field_strings() {
    let mut rec = record("a:b/c", "descr", Value::from("up,  link=core \"x\""));
    rec.keys
        .insert("name".to_string(), Value::from("Gi0/0,hundredGigE"));

    let line = InfluxdbSink::line(&rec, 0);
    assert!(line.contains("name=Gi0/0\\,hundredGigE"));
    assert!(line.contains("descr=\"up\\, link\\=core x\""));
}

#[test]
fn influx_batch_deduplicates_identical_timestamps() {
    let records = vec![
        record("a:b/c", "in-octets", Value::from(1)),
        record("a:b/c", "in-octets", Value::from(1)),
        record("a:b/c", "in-octets", Value::from(1)),
    ];
    let lines = InfluxdbSink::lines(&records);
    assert!(lines[0].ends_with("1700000000000000000"));
    assert!(lines[1].ends_with("1700000000000000001"));
    assert!(lines[2].ends_with("1700000000000000002"));
}

#[test]
fn influx_promotes_empty_string_fields_to_tags() {
    let rec = record("a:b/c", "description", Value::from(""));
    let line = InfluxdbSink::line(&rec, 0);

    let (tags, rest) = line.split_once(' ').unwrap();
    assert!(tags.contains("description=\"\""));
    assert!(rest.starts_with("description=\"\""));
}

#[test]
fn influx_renders_delete_records() {
    let rec = record("foo/bar", "delete", Value::Bool(true));
    let line = InfluxdbSink::line(&rec, 0);
    assert!(line.contains(" delete=true "));
}

use serde_json::{Map, Number, Value};

use crate::errors::ParseError;
use crate::parser::model::{ParsedResponse, RawRecord};
use crate::proto::telemetry::{telemetry, telemetry_field, Telemetry, TelemetryField};

/// Nanoseconds per millisecond; EMS group timestamps arrive in ms.
const MS_TO_NS: i64 = 1_000_000;

/// Normalize one decoded `Telemetry` message into flat records.
///
/// Each `data_gpbkv` group carries a `keys` leaf list and a `content` tree.
/// The content tree is walked depth-first and one record is emitted for
/// every level that holds leaves; non-leaf siblings recurse as their own
/// emissions. A group flagged `delete` yields a single
/// `{"delete": true}` record instead.
pub fn parse_ems(
    message: &Telemetry,
    record: &RawRecord,
) -> Result<Vec<ParsedResponse>, ParseError> {
    let hostname = match &message.node_id {
        Some(telemetry::NodeId::NodeIdStr(node)) if !node.is_empty() => node.clone(),
        _ => record.hostname.clone().unwrap_or_default(),
    };
    let version = record.version.clone().unwrap_or_default();

    let mut records = Vec::new();
    for group in &message.data_gpbkv {
        parse_group(group, message, record, &hostname, &version, &mut records);
    }
    Ok(records)
}

fn parse_group(
    group: &TelemetryField,
    message: &Telemetry,
    record: &RawRecord,
    hostname: &str,
    version: &str,
    records: &mut Vec<ParsedResponse>,
) {
    let timestamp_ns = group.timestamp as i64 * MS_TO_NS;
    let keys = group
        .fields
        .iter()
        .find(|field| field.name == "keys")
        .map(parse_keys)
        .unwrap_or_default();

    let template = ParsedResponse {
        yang_path: message.encoding_path.clone(),
        encoding: "grpc".to_string(),
        hostname: hostname.to_string(),
        version: version.to_string(),
        ip: record.peer.clone(),
        timestamp_ns,
        keys,
        content: Map::new(),
    };

    if group.delete {
        let mut deleted = template;
        deleted
            .content
            .insert("delete".to_string(), Value::Bool(true));
        records.push(deleted);
        return;
    }

    let before = records.len();
    if let Some(content) = group.fields.iter().find(|field| field.name == "content") {
        walk_content(&content.fields, &message.encoding_path, &template, records);
    }

    // A group with no non-key leaves still accounts for one record.
    if records.len() == before {
        records.push(template);
    }
}

/// Emit one record for the leaves at this level, then recurse into the
/// subtrees, extending the yang path by each subtree's name.
fn walk_content(
    fields: &[TelemetryField],
    yang_path: &str,
    template: &ParsedResponse,
    records: &mut Vec<ParsedResponse>,
) {
    let mut leaves = Map::new();
    for field in fields {
        if field.fields.is_empty() {
            insert_leaf(&mut leaves, &field.name, scalar_value(field));
        }
    }

    if !leaves.is_empty() {
        let mut emitted = template.clone();
        emitted.yang_path = yang_path.to_string();
        // A leaf name present in both maps is reported from content only.
        emitted.keys.retain(|name, _| !leaves.contains_key(name));
        emitted.content = leaves;
        records.push(emitted);
    }

    for field in fields {
        if !field.fields.is_empty() {
            let child_path = format!("{}/{}", yang_path, field.name);
            walk_content(&field.fields, &child_path, template, records);
        }
    }
}

/// Repeated leaf names at one level collapse into a list.
fn insert_leaf(map: &mut Map<String, Value>, name: &str, value: Value) {
    match map.get_mut(name) {
        Some(Value::Array(existing)) => existing.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name.to_string(), value);
        }
    }
}

fn parse_keys(keys_field: &TelemetryField) -> Map<String, Value> {
    let mut keys = Map::new();
    for field in &keys_field.fields {
        insert_leaf(&mut keys, &field.name, scalar_value(field));
    }
    keys
}

fn scalar_value(field: &TelemetryField) -> Value {
    use telemetry_field::ValueByType as V;

    match &field.value_by_type {
        // An unset discriminant decodes as the empty string.
        None => Value::String(String::new()),
        Some(V::BytesValue(b)) => Value::String(String::from_utf8_lossy(b).into_owned()),
        Some(V::StringValue(s)) => Value::String(s.clone()),
        Some(V::BoolValue(b)) => Value::Bool(*b),
        Some(V::Uint32Value(u)) => Value::Number(Number::from(*u)),
        Some(V::Uint64Value(u)) => {
            if *u > i64::MAX as u64 {
                Value::String(u.to_string())
            } else {
                Value::Number(Number::from(*u as i64))
            }
        }
        Some(V::Sint32Value(i)) => Value::Number(Number::from(*i)),
        Some(V::Sint64Value(i)) => Value::Number(Number::from(*i)),
        Some(V::DoubleValue(d)) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        Some(V::FloatValue(f)) => Number::from_f64(f64::from(*f))
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

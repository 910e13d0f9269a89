use serde_json::{Map, Number, Value};

use crate::errors::ParseError;
use crate::parser::model::{ParsedResponse, RawRecord};
use crate::proto::gnmi::{subscribe_response, typed_value, Notification, SubscribeResponse, TypedValue};

/// Normalize one decoded `SubscribeResponse` into flat records.
///
/// `sync_response` messages are a signal only and yield nothing; error
/// responses are raised at the connector before a record is ever enqueued,
/// so they also yield nothing here. Updates sharing the same full yang path
/// and list keys merge into a single record.
pub fn parse_gnmi(
    response: &SubscribeResponse,
    record: &RawRecord,
) -> Result<Vec<ParsedResponse>, ParseError> {
    let notification = match &response.response {
        Some(subscribe_response::Response::Update(notification)) => notification,
        _ => return Ok(Vec::new()),
    };

    let (prefix, prefix_keys) = render_prefix(notification);
    let mut records: Vec<ParsedResponse> = Vec::new();

    for update in &notification.update {
        let elems = match &update.path {
            Some(path) => &path.elem,
            None => continue,
        };
        let Some((leaf_elem, parents)) = elems.split_last() else {
            continue;
        };

        let mut keys = prefix_keys.clone();
        for elem in elems {
            for (k, v) in &elem.key {
                keys.insert(k.clone(), Value::String(v.clone()));
            }
        }

        let sub_path = parents
            .iter()
            .map(|elem| elem.name.as_str())
            .collect::<Vec<_>>()
            .join("/");
        let yang_path = join_path(&prefix, &sub_path);

        let value = match &update.val {
            Some(val) => typed_value_to_json(val, &yang_path)?,
            None => Value::String(String::new()),
        };

        match records
            .iter_mut()
            .find(|r| r.yang_path == yang_path && r.keys == keys)
        {
            Some(existing) => {
                existing.content.insert(leaf_elem.name.clone(), value);
            }
            None => {
                let mut content = Map::new();
                content.insert(leaf_elem.name.clone(), value);
                records.push(ParsedResponse {
                    yang_path,
                    encoding: "gnmi".to_string(),
                    hostname: record.hostname.clone().unwrap_or_default(),
                    version: record.version.clone().unwrap_or_default(),
                    ip: record.peer.clone(),
                    timestamp_ns: notification.timestamp,
                    keys,
                    content,
                });
            }
        }
    }

    Ok(records)
}

/// Render the notification prefix as `origin:elem0/elem1/...` and gather its
/// list keys.
fn render_prefix(notification: &Notification) -> (String, Map<String, Value>) {
    let mut keys = Map::new();
    let Some(prefix) = &notification.prefix else {
        return (String::new(), keys);
    };

    let mut names = Vec::with_capacity(prefix.elem.len());
    for elem in &prefix.elem {
        names.push(elem.name.as_str());
        for (k, v) in &elem.key {
            keys.insert(k.clone(), Value::String(v.clone()));
        }
    }

    let joined = names.join("/");
    let rendered = if prefix.origin.is_empty() {
        joined
    } else {
        format!("{}:{}", prefix.origin, joined)
    };
    (rendered, keys)
}

/// Canonical join rule: `prefix + "/" + sub_path` when both sides are
/// non-empty, otherwise whichever side is present.
fn join_path(prefix: &str, sub_path: &str) -> String {
    if sub_path.is_empty() {
        prefix.to_string()
    } else if prefix.is_empty() {
        sub_path.to_string()
    } else {
        format!("{prefix}/{sub_path}")
    }
}

fn typed_value_to_json(val: &TypedValue, yang_path: &str) -> Result<Value, ParseError> {
    use typed_value::Value as V;

    let value = match &val.value {
        None => Value::String(String::new()),
        Some(V::StringVal(s)) => Value::String(s.clone()),
        Some(V::AsciiVal(s)) => Value::String(s.clone()),
        Some(V::ProtoBytes(b)) => Value::String(String::from_utf8_lossy(b).into_owned()),
        Some(V::IntVal(i)) => Value::Number(Number::from(*i)),
        Some(V::UintVal(u)) => uint_to_json(*u),
        Some(V::BoolVal(b)) => Value::Bool(*b),
        Some(V::BytesVal(b)) => Value::String(String::from_utf8_lossy(b).into_owned()),
        Some(V::FloatVal(f)) => Number::from_f64(f64::from(*f))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(V::DecimalVal(d)) => Value::Number(Number::from(d.digits)),
        Some(V::LeaflistVal(list)) => Value::Array(
            list.element
                .iter()
                .map(|element| typed_value_to_json(element, yang_path))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(V::JsonVal(b)) | Some(V::JsonIetfVal(b)) => {
            serde_json::from_slice(b).map_err(|source| ParseError::Json {
                path: yang_path.to_string(),
                source,
            })?
        }
    };
    Ok(value)
}

/// Unsigned values above `i64::MAX` are rendered as decimal strings so the
/// sinks never see an integer they cannot represent.
fn uint_to_json(value: u64) -> Value {
    if value > i64::MAX as u64 {
        Value::String(value.to_string())
    } else {
        Value::Number(Number::from(value as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_uint_becomes_decimal_string() {
        assert_eq!(
            uint_to_json(9_223_372_036_854_775_808),
            Value::String("9223372036854775808".to_string())
        );
        assert_eq!(uint_to_json(42), Value::Number(Number::from(42)));
    }

    #[test]
    fn join_rule_is_uniform() {
        assert_eq!(join_path("a:b", "c/d"), "a:b/c/d");
        assert_eq!(join_path("a:b", ""), "a:b");
        assert_eq!(join_path("", "c"), "c");
    }
}

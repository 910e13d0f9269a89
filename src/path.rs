use std::collections::HashMap;

use percent_encoding::percent_decode_str;

use crate::proto::gnmi::{Path, PathElem};

/// Parse a gNMI path string into a `Path` message.
///
/// Splits on `/` except inside `[...]` key groups, so a key value such as
/// `[k=v/x]` stays in one element. Optional leading and trailing slashes are
/// stripped. Each segment of the form `name[k1=v1][k2=v2]` yields a
/// `PathElem` with the keys collected into its map; key values are split on
/// the first `=` only, so values may themselves contain `=`.
pub fn parse_gnmi_path(path: &str) -> Path {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Path::default();
    }

    let mut elems = Vec::new();
    for segment in split_outside_brackets(trimmed) {
        elems.push(parse_path_elem(segment));
    }
    Path {
        elem: elems,
        ..Default::default()
    }
}

fn split_outside_brackets(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);
    parts
}

fn parse_path_elem(segment: &str) -> PathElem {
    let name_end = segment.find('[').unwrap_or(segment.len());
    let name = segment[..name_end].to_string();

    let mut keys = HashMap::new();
    let mut rest = &segment[name_end..];
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        let group = &rest[open + 1..open + close];
        if let Some((key, value)) = group.split_once('=') {
            keys.insert(key.to_string(), value.to_string());
        }
        rest = &rest[open + close + 1..];
    }

    PathElem { name, key: keys }
}

/// Derive the sink index name for a yang path.
///
/// URL-decodes the path, lowercases it, maps `/`, `:` and `[` to `-`, drops
/// `]` and `"`, then appends `-<date>`. If the result would exceed 255
/// bytes, leading `-`-separated segments are dropped until it fits; the date
/// suffix always survives. Reapplying the function to its own output is a
/// no-op apart from the date suffix.
pub fn index_from_yang_path(yang_path: &str, date: &str) -> String {
    let decoded = percent_decode_str(yang_path).decode_utf8_lossy();
    let mut index = String::with_capacity(decoded.len());
    for c in decoded.to_lowercase().chars() {
        match c {
            '/' | ':' | '[' => index.push('-'),
            ']' | '"' => {}
            other => index.push(other),
        }
    }

    let limit = 255usize.saturating_sub(date.len() + 1);
    while index.len() > limit {
        match index.split_once('-') {
            Some((_, rest)) => index = rest.to_string(),
            None => {
                index.truncate(limit);
                break;
            }
        }
    }

    format!("{index}-{date}")
}

/// Today's date in the `YYYY.MM.DD` form the index names carry.
pub fn today_date() -> String {
    chrono::Utc::now().format("%Y.%m.%d").to_string()
}

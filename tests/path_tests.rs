use mdtrelay::path::{index_from_yang_path, parse_gnmi_path};

const DATE: &str = "2026.08.01";

#[test]
fn bracketed_slash_does_not_split_elements() {
    let path = parse_gnmi_path("/a/b[k=v/x]/c");
    assert_eq!(path.elem.len(), 3);
    assert_eq!(path.elem[1].name, "b");
    assert_eq!(path.elem[1].key.get("k").map(String::as_str), Some("v/x"));
}

#[test]
fn index_lowercases_and_replaces_separators() {
    let index = index_from_yang_path(
        "Cisco-IOS-XR-infra-statsd-oper:infra-statistics/interfaces",
        DATE,
    );
    assert_eq!(
        index,
        "cisco-ios-xr-infra-statsd-oper-infra-statistics-interfaces-2026.08.01"
    );
}

#[test]
fn index_drops_brackets_and_quotes() {
    let index = index_from_yang_path("a:b/c[name=\"Gi0\"]/d", DATE);
    assert_eq!(index, "a-b-c-name=gi0-d-2026.08.01");
}

#[test]
fn index_url_decodes_before_normalizing() {
    let index = index_from_yang_path("a:b%2Fc/d", DATE);
    assert_eq!(index, "a-b-c-d-2026.08.01");
}

#[test]
fn long_path_truncates_to_255_bytes_and_keeps_date() {
    let long_path: String = (0..60)
        .map(|i| format!("segment{i}"))
        .collect::<Vec<_>>()
        .join("/");
    assert!(long_path.len() > 300);

    let index = index_from_yang_path(&long_path, DATE);
    assert!(index.len() <= 255, "index was {} bytes", index.len());
    assert!(index.ends_with("-2026.08.01"));
}

#[test]
fn index_derivation_is_idempotent() {
    let first = index_from_yang_path("OpenConfig-Interfaces:interfaces/interface", DATE);
    let second = index_from_yang_path(&first, DATE);
    // The only difference is the date suffix applied a second time.
    assert_eq!(second, format!("{first}-{DATE}"));
}

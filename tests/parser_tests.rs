use prost::Message;
use serde_json::Value;

use mdtrelay::parser::{process_record, RawRecord, TelemetryEncoding};
use mdtrelay::proto::gnmi::{
    subscribe_response, Notification, Path, PathElem, SubscribeResponse, TypedValue, Update,
};
use mdtrelay::proto::telemetry::{telemetry, telemetry_field, Telemetry, TelemetryField};

fn path_elem(name: &str) -> PathElem {
    PathElem {
        name: name.to_string(),
        key: Default::default(),
    }
}

fn keyed_elem(name: &str, key: &str, value: &str) -> PathElem {
    PathElem {
        name: name.to_string(),
        key: [(key.to_string(), value.to_string())].into_iter().collect(),
    }
}

fn string_update(elems: Vec<PathElem>, value: &str) -> Update {
    Update {
        path: Some(Path {
            elem: elems,
            ..Default::default()
        }),
        val: Some(TypedValue {
            value: Some(mdtrelay::proto::typed_value::Value::StringVal(
                value.to_string(),
            )),
        }),
        duplicates: 0,
    }
}

fn gnmi_record(response: &SubscribeResponse) -> RawRecord {
    RawRecord {
        encoding: TelemetryEncoding::Gnmi,
        payload: response.encode_to_vec(),
        hostname: Some("core-1".to_string()),
        version: Some("7.3.1".to_string()),
        peer: "10.0.0.1".to_string(),
    }
}

fn ems_record(message: &Telemetry) -> RawRecord {
    RawRecord {
        encoding: TelemetryEncoding::Ems,
        payload: message.encode_to_vec(),
        hostname: None,
        version: Some("7.3.1".to_string()),
        peer: "10.0.0.2".to_string(),
    }
}

fn leaf_field(name: &str, value: telemetry_field::ValueByType) -> TelemetryField {
    TelemetryField {
        name: name.to_string(),
        value_by_type: Some(value),
        ..Default::default()
    }
}

fn tree_field(name: &str, children: Vec<TelemetryField>) -> TelemetryField {
    TelemetryField {
        name: name.to_string(),
        fields: children,
        ..Default::default()
    }
}

fn string_leaf(name: &str, value: &str) -> TelemetryField {
    leaf_field(
        name,
        telemetry_field::ValueByType::StringValue(value.to_string()),
    )
}

#[test]
fn gnmi_scalar_update() {
    let response = SubscribeResponse {
        response: Some(subscribe_response::Response::Update(Notification {
            timestamp: 1_700_000_000_000_000_000,
            prefix: Some(Path {
                origin: "openconfig-interfaces".to_string(),
                elem: vec![path_elem("interfaces")],
                ..Default::default()
            }),
            update: vec![string_update(
                vec![
                    keyed_elem("interface", "name", "Gi0"),
                    path_elem("state"),
                    path_elem("oper-status"),
                ],
                "UP",
            )],
            ..Default::default()
        })),
    };

    let parsed = process_record(&gnmi_record(&response)).unwrap();
    assert_eq!(parsed.len(), 1);
    let record = &parsed[0];
    assert_eq!(
        record.yang_path,
        "openconfig-interfaces:interfaces/interface/state"
    );
    assert_eq!(record.encoding, "gnmi");
    assert_eq!(record.hostname, "core-1");
    assert_eq!(record.version, "7.3.1");
    assert_eq!(record.ip, "10.0.0.1");
    assert_eq!(record.timestamp_ns, 1_700_000_000_000_000_000);
    assert_eq!(record.keys.get("name"), Some(&Value::from("Gi0")));
    assert_eq!(record.content.get("oper-status"), Some(&Value::from("UP")));
}

#[test]
fn gnmi_big_uint_becomes_decimal_string() {
    let response = SubscribeResponse {
        response: Some(subscribe_response::Response::Update(Notification {
            timestamp: 1,
            prefix: Some(Path {
                origin: "o".to_string(),
                elem: vec![path_elem("counters")],
                ..Default::default()
            }),
            update: vec![Update {
                path: Some(Path {
                    elem: vec![path_elem("in-octets")],
                    ..Default::default()
                }),
                val: Some(TypedValue {
                    value: Some(mdtrelay::proto::typed_value::Value::UintVal(1u64 << 63)),
                }),
                duplicates: 0,
            }],
            ..Default::default()
        })),
    };

    let parsed = process_record(&gnmi_record(&response)).unwrap();
    assert_eq!(
        parsed[0].content.get("in-octets"),
        Some(&Value::from("9223372036854775808"))
    );
}

#[test]
fn gnmi_updates_sharing_a_path_merge() {
    let response = SubscribeResponse {
        response: Some(subscribe_response::Response::Update(Notification {
            timestamp: 5,
            prefix: Some(Path {
                origin: "openconfig-interfaces".to_string(),
                elem: vec![path_elem("interfaces")],
                ..Default::default()
            }),
            update: vec![
                string_update(
                    vec![
                        keyed_elem("interface", "name", "Gi0"),
                        path_elem("state"),
                        path_elem("oper-status"),
                    ],
                    "UP",
                ),
                string_update(
                    vec![
                        keyed_elem("interface", "name", "Gi0"),
                        path_elem("state"),
                        path_elem("admin-status"),
                    ],
                    "UP",
                ),
                // Different list key: stays its own record.
                string_update(
                    vec![
                        keyed_elem("interface", "name", "Gi1"),
                        path_elem("state"),
                        path_elem("oper-status"),
                    ],
                    "DOWN",
                ),
            ],
            ..Default::default()
        })),
    };

    let parsed = process_record(&gnmi_record(&response)).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].content.len(), 2);
    assert_eq!(parsed[0].keys.get("name"), Some(&Value::from("Gi0")));
    assert_eq!(parsed[1].keys.get("name"), Some(&Value::from("Gi1")));
}

#[test]
fn gnmi_sync_response_yields_nothing() {
    let response = SubscribeResponse {
        response: Some(subscribe_response::Response::SyncResponse(true)),
    };
    let parsed = process_record(&gnmi_record(&response)).unwrap();
    assert!(parsed.is_empty());
}

#[test]
fn ems_delete_notification() {
    let message = Telemetry {
        encoding_path: "foo/bar".to_string(),
        data_gpbkv: vec![TelemetryField {
            timestamp: 1000,
            delete: true,
            fields: vec![tree_field("keys", vec![string_leaf("id", "1")])],
            ..Default::default()
        }],
        ..Default::default()
    };

    let parsed = process_record(&ems_record(&message)).unwrap();
    assert_eq!(parsed.len(), 1);
    let record = &parsed[0];
    assert_eq!(record.yang_path, "foo/bar");
    assert_eq!(record.encoding, "grpc");
    assert_eq!(record.timestamp_ns, 1_000_000_000);
    assert_eq!(record.keys.get("id"), Some(&Value::from("1")));
    assert_eq!(record.content.get("delete"), Some(&Value::Bool(true)));
}

#[test]
fn ems_emits_one_record_per_level_with_leaves() {
    let message = Telemetry {
        node_id: Some(telemetry::NodeId::NodeIdStr("edge-2".to_string())),
        encoding_path: "Cisco-IOS-XR-infra-statsd-oper:infra-statistics/interfaces".to_string(),
        data_gpbkv: vec![TelemetryField {
            timestamp: 2000,
            fields: vec![
                tree_field("keys", vec![string_leaf("interface-name", "Gi0")]),
                tree_field(
                    "content",
                    vec![
                        leaf_field(
                            "packets-in",
                            telemetry_field::ValueByType::Uint64Value(100),
                        ),
                        tree_field(
                            "latest-clear",
                            vec![leaf_field(
                                "seconds",
                                telemetry_field::ValueByType::Uint32Value(7),
                            )],
                        ),
                    ],
                ),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    let parsed = process_record(&ems_record(&message)).unwrap();
    assert_eq!(parsed.len(), 2);

    let top = &parsed[0];
    assert_eq!(
        top.yang_path,
        "Cisco-IOS-XR-infra-statsd-oper:infra-statistics/interfaces"
    );
    assert_eq!(top.hostname, "edge-2");
    assert_eq!(top.timestamp_ns, 2_000_000_000);
    assert_eq!(top.content.get("packets-in"), Some(&Value::from(100)));
    assert_eq!(
        top.keys.get("interface-name"),
        Some(&Value::from("Gi0"))
    );

    let nested = &parsed[1];
    assert_eq!(
        nested.yang_path,
        "Cisco-IOS-XR-infra-statsd-oper:infra-statistics/interfaces/latest-clear"
    );
    assert_eq!(nested.content.get("seconds"), Some(&Value::from(7)));
    // Keys carry over to every level of the group.
    assert_eq!(nested.keys.get("interface-name"), Some(&Value::from("Gi0")));
}

#[test]
fn ems_repeated_leaf_names_collapse_to_a_list() {
    let message = Telemetry {
        encoding_path: "foo".to_string(),
        data_gpbkv: vec![TelemetryField {
            timestamp: 1,
            fields: vec![
                tree_field("keys", vec![]),
                tree_field(
                    "content",
                    vec![string_leaf("dns-server", "10.0.0.53"), string_leaf("dns-server", "10.0.1.53")],
                ),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    let parsed = process_record(&ems_record(&message)).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(
        parsed[0].content.get("dns-server"),
        Some(&Value::from(vec!["10.0.0.53", "10.0.1.53"]))
    );
}

#[test]
fn ems_content_wins_leaf_name_collisions() {
    let message = Telemetry {
        encoding_path: "foo".to_string(),
        data_gpbkv: vec![TelemetryField {
            timestamp: 1,
            fields: vec![
                tree_field("keys", vec![string_leaf("node", "key-side")]),
                tree_field("content", vec![string_leaf("node", "content-side")]),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    let parsed = process_record(&ems_record(&message)).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(
        parsed[0].content.get("node"),
        Some(&Value::from("content-side"))
    );
    assert!(parsed[0].keys.get("node").is_none());
}

#[test]
fn ems_group_without_content_still_emits_one_record() {
    let message = Telemetry {
        encoding_path: "foo".to_string(),
        data_gpbkv: vec![TelemetryField {
            timestamp: 1,
            fields: vec![tree_field("keys", vec![string_leaf("id", "7")])],
            ..Default::default()
        }],
        ..Default::default()
    };

    let parsed = process_record(&ems_record(&message)).unwrap();
    assert_eq!(parsed.len(), 1);
    assert!(parsed[0].content.is_empty());
    assert_eq!(parsed[0].keys.get("id"), Some(&Value::from("7")));
}

#[test]
fn ems_unset_scalar_decodes_as_empty_string() {
    let message = Telemetry {
        encoding_path: "foo".to_string(),
        data_gpbkv: vec![TelemetryField {
            timestamp: 1,
            fields: vec![
                tree_field("keys", vec![]),
                tree_field(
                    "content",
                    vec![TelemetryField {
                        name: "reason".to_string(),
                        ..Default::default()
                    }],
                ),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };

    let parsed = process_record(&ems_record(&message)).unwrap();
    assert_eq!(parsed[0].content.get("reason"), Some(&Value::from("")));
}

#[test]
fn empty_telemetry_yields_no_records() {
    let message = Telemetry {
        encoding_path: "foo".to_string(),
        ..Default::default()
    };
    let parsed = process_record(&ems_record(&message)).unwrap();
    assert!(parsed.is_empty());
}

#[test]
fn garbage_payload_is_a_decode_error() {
    let record = RawRecord {
        encoding: TelemetryEncoding::Gnmi,
        payload: vec![0xff; 16],
        hostname: None,
        version: None,
        peer: "10.0.0.1".to_string(),
    };
    assert!(process_record(&record).is_err());
}

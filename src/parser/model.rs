use serde_json::{Map, Value};

/// Wire encoding of a raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryEncoding {
    /// Vendor EMS `Telemetry` message.
    Ems,
    /// gNMI `SubscribeResponse` message.
    Gnmi,
}

impl TelemetryEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryEncoding::Ems => "ems",
            TelemetryEncoding::Gnmi => "gnmi",
        }
    }
}

/// One undecoded message captured by a collector.
///
/// Immutable once enqueued. The payload holds exactly one wire message and
/// is never decoded by the collector itself; the worker pool decodes it.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub encoding: TelemetryEncoding,
    pub payload: Vec<u8>,
    /// Resolved by gNMI dial-in collectors; EMS and dial-out leave it unset.
    pub hostname: Option<String>,
    /// Device software version resolved by dial-in collectors.
    pub version: Option<String>,
    /// Source IP of the device, as text.
    pub peer: String,
}

/// A flat, normalized telemetry record keyed by yang path.
///
/// Every scalar in `keys` and `content` is a string, signed 64-bit integer
/// (unsigned values above `i64::MAX` are rendered as decimal strings), bool,
/// float, bytes rendered as a string, or a nested JSON value. A record whose
/// content is `{"delete": true}` is a delete notification for `yang_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub yang_path: String,
    /// `"gnmi"` for gNMI-sourced records, `"grpc"` for EMS-sourced ones.
    pub encoding: String,
    pub hostname: String,
    pub version: String,
    pub ip: String,
    pub timestamp_ns: i64,
    /// List keys of the containing list element.
    pub keys: Map<String, Value>,
    /// Non-key leaf values at this subtree.
    pub content: Map<String, Value>,
}

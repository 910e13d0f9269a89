use prost::Message;

use crate::errors::DecodeError;
use crate::proto::gnmi::SubscribeResponse;
use crate::proto::telemetry::Telemetry;

/// Decode the payload of a gNMI record. Pure function, no I/O.
pub fn decode_gnmi(payload: &[u8]) -> Result<SubscribeResponse, DecodeError> {
    SubscribeResponse::decode(payload).map_err(|source| DecodeError {
        encoding: "gnmi",
        source,
    })
}

/// Decode the payload of an EMS record. Pure function, no I/O.
pub fn decode_ems(payload: &[u8]) -> Result<Telemetry, DecodeError> {
    Telemetry::decode(payload).map_err(|source| DecodeError {
        encoding: "ems",
        source,
    })
}

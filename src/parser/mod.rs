pub mod decoder;
pub mod ems;
pub mod gnmi;
pub mod model;

pub use model::{ParsedResponse, RawRecord, TelemetryEncoding};

use crate::errors::RecordError;

/// Decode and normalize one raw record.
///
/// Failures are record-local: the caller logs, counts, and drops the record
/// while the rest of the batch proceeds.
pub fn process_record(record: &RawRecord) -> Result<Vec<ParsedResponse>, RecordError> {
    match record.encoding {
        TelemetryEncoding::Gnmi => {
            let response = decoder::decode_gnmi(&record.payload)?;
            Ok(gnmi::parse_gnmi(&response, record)?)
        }
        TelemetryEncoding::Ems => {
            let message = decoder::decode_ems(&record.payload)?;
            Ok(ems::parse_ems(&message, record)?)
        }
    }
}

pub mod config;
pub mod connectors;
pub mod errors;
pub mod logging;
pub mod parser;
pub mod path;
pub mod proto;
pub mod sinks;
pub mod supervisor;

// Re-export important types and functions for easier access
pub use config::data_model::{InputConfig, OutputConfig, RuntimeConfig};
pub use errors::{
    ConfigError, ConnectError, DecodeError, ParseError, RecordError, RpcError, SinkError,
};
pub use parser::{ParsedResponse, RawRecord, TelemetryEncoding};
pub use sinks::Sink;
pub use supervisor::Supervisor;

use thiserror::Error;

/// Fatal configuration problems detected at startup.
///
/// Any of these aborts the process with exit code 1 before the pipeline
/// starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration must define at least one input and one output")]
    IoNotDefined,

    #[error("input [{section}]: missing required option `{option}`")]
    MissingOption { section: String, option: String },

    #[error("input [{section}]: invalid value `{value}` for option `{option}`")]
    InvalidOption {
        section: String,
        option: String,
        value: String,
    },

    #[error("output [{section}]: missing required option `{option}`")]
    MissingOutputOption { section: String, option: String },

    #[error("failed to read pem file {path}: {source}")]
    PemFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Failure to establish a gRPC channel to a device. Retryable per the
/// connector's policy.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: tonic::transport::Error,
    },

    #[error("invalid endpoint {endpoint}: {source}")]
    Endpoint {
        endpoint: String,
        source: tonic::transport::Error,
    },
}

/// Failure on an established RPC. Retryable per the connector's policy.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("device returned error segment: {0}")]
    Segment(String),

    #[error("invalid request metadata for `{key}`")]
    Metadata { key: &'static str },

    #[error("get for {path} returned no `{leaf}` leaf")]
    LeafNotFound { path: String, leaf: String },
}

/// A single connector attempt failed; the run loop maps this onto the
/// backoff state machine.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// A raw payload that does not decode as its declared message type.
/// Record-local: the record is dropped, the batch proceeds.
#[derive(Debug, Error)]
#[error("failed to decode {encoding} payload: {source}")]
pub struct DecodeError {
    pub encoding: &'static str,
    #[source]
    pub source: prost::DecodeError,
}

/// A decoded message that cannot be normalized. Record-local.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json value at {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Decode or parse failure for one raw record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Outcome classification for a failed sink upload.
///
/// `Retryable` re-queues the batch (bounded); `Permanent` drops it with an
/// error log. A failing sink never aborts its peers.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("retryable sink failure: {0}")]
    Retryable(String),

    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

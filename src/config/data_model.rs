use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::proto::gnmi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialMode {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFormat {
    #[serde(rename = "gnmi")]
    Gnmi,
    #[serde(rename = "cisco-ems")]
    CiscoEms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GnmiEncoding {
    #[serde(rename = "PROTO")]
    Proto,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "JSON_IETF")]
    JsonIetf,
    #[serde(rename = "BYTES")]
    Bytes,
    #[serde(rename = "ASCII")]
    Ascii,
}

impl GnmiEncoding {
    pub fn to_proto(self) -> gnmi::Encoding {
        match self {
            GnmiEncoding::Proto => gnmi::Encoding::Proto,
            GnmiEncoding::Json => gnmi::Encoding::Json,
            GnmiEncoding::JsonIetf => gnmi::Encoding::JsonIetf,
            GnmiEncoding::Bytes => gnmi::Encoding::Bytes,
            GnmiEncoding::Ascii => gnmi::Encoding::Ascii,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmsEncoding {
    #[serde(rename = "gpb")]
    Gpb,
    #[serde(rename = "self-describing-gpb")]
    SelfDescribingGpb,
    #[serde(rename = "json")]
    Json,
}

impl EmsEncoding {
    /// Wire value of the `encode` argument in `CreateSubsArgs`.
    pub fn wire_value(self) -> i64 {
        match self {
            EmsEncoding::Gpb => 2,
            EmsEncoding::SelfDescribingGpb => 3,
            EmsEncoding::Json => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GnmiSubscriptionMode {
    #[serde(rename = "TARGET_DEFINED")]
    TargetDefined,
    #[serde(rename = "ON_CHANGE")]
    OnChange,
    #[serde(rename = "SAMPLE")]
    Sample,
}

impl GnmiSubscriptionMode {
    pub fn to_proto(self) -> gnmi::SubscriptionMode {
        match self {
            GnmiSubscriptionMode::TargetDefined => gnmi::SubscriptionMode::TargetDefined,
            GnmiSubscriptionMode::OnChange => gnmi::SubscriptionMode::OnChange,
            GnmiSubscriptionMode::Sample => gnmi::SubscriptionMode::Sample,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GnmiStreamMode {
    #[serde(rename = "STREAM")]
    Stream,
    #[serde(rename = "ONCE")]
    Once,
    #[serde(rename = "POLL")]
    Poll,
}

impl GnmiStreamMode {
    pub fn to_proto(self) -> gnmi::subscription_list::Mode {
        match self {
            GnmiStreamMode::Stream => gnmi::subscription_list::Mode::Stream,
            GnmiStreamMode::Once => gnmi::subscription_list::Mode::Once,
            GnmiStreamMode::Poll => gnmi::subscription_list::Mode::Poll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkKind {
    #[serde(rename = "elasticsearch")]
    Elasticsearch,
    #[serde(rename = "influxdb")]
    Influxdb,
    #[serde(rename = "influxdbv2")]
    Influxdbv2,
}

/// One input stanza as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputStanza {
    pub dial: DialMode,
    pub address: String,
    pub port: u16,
    pub format: Option<InputFormat>,
    pub encoding: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pem_file: Option<String>,
    #[serde(default)]
    pub compression: bool,
    #[serde(default)]
    pub sensors: Vec<String>,
    /// Seconds; scaled to nanoseconds at validation time.
    pub sample_interval: Option<u64>,
    pub subscription_mode: Option<GnmiSubscriptionMode>,
    pub stream_mode: Option<GnmiStreamMode>,
    #[serde(default)]
    pub subscriptions: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub retry: bool,
}

/// One output stanza as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputStanza {
    #[serde(rename = "type")]
    pub kind: SinkKind,
    pub address: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: Option<String>,
    pub database: Option<String>,
}

/// The whole declarative catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    #[serde(default)]
    pub inputs: HashMap<String, InputStanza>,
    #[serde(default)]
    pub outputs: HashMap<String, OutputStanza>,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_queue_depth() -> usize {
    10_000
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_drain_timeout_secs() -> u64 {
    30
}

/// Subscription shape of a validated input.
#[derive(Debug, Clone)]
pub enum SubscriptionConfig {
    Gnmi {
        sensors: Vec<String>,
        sample_interval_ns: u64,
        mode: GnmiSubscriptionMode,
        stream_mode: GnmiStreamMode,
        encoding: GnmiEncoding,
    },
    Ems {
        subscriptions: Vec<String>,
        encoding: EmsEncoding,
    },
    /// Device-initiated stream; nothing to subscribe to.
    DialOut,
}

/// A validated input, ready to hand to a connector.
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub name: String,
    pub dial: DialMode,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// PEM bytes; presence enables TLS on the channel.
    pub pem: Option<Vec<u8>>,
    pub compression: bool,
    pub subscription: SubscriptionConfig,
    pub batch_size: usize,
    pub retry: bool,
}

/// Authentication shape of a validated output.
#[derive(Debug, Clone)]
pub enum SinkAuth {
    None,
    Basic { username: String, password: String },
    Token { token: String },
}

/// A validated output, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub name: String,
    pub kind: SinkKind,
    pub address: String,
    pub port: u16,
    pub auth: SinkAuth,
    /// v1 database or v2 bucket, depending on `kind`.
    pub database: Option<String>,
    pub org: Option<String>,
}

/// Fully validated runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub inputs: Vec<InputConfig>,
    pub outputs: Vec<OutputConfig>,
    pub worker_pool_size: usize,
    pub queue_depth: usize,
    /// Supervisor batch size: the smallest batch-size across inputs, so no
    /// input waits longer than its own stanza asked for.
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub drain_timeout: Duration,
}

impl ConfigFile {
    /// Validate the catalog and resolve file references.
    pub fn into_runtime(self) -> Result<RuntimeConfig, ConfigError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(ConfigError::IoNotDefined);
        }

        // Stanza maps are unordered; sort by name for stable startup logs.
        let mut input_stanzas: Vec<_> = self.inputs.into_iter().collect();
        input_stanzas.sort_by(|a, b| a.0.cmp(&b.0));
        let mut inputs = Vec::with_capacity(input_stanzas.len());
        for (name, stanza) in input_stanzas {
            inputs.push(validate_input(name, stanza)?);
        }

        let mut output_stanzas: Vec<_> = self.outputs.into_iter().collect();
        output_stanzas.sort_by(|a, b| a.0.cmp(&b.0));
        let mut outputs = Vec::with_capacity(output_stanzas.len());
        for (name, stanza) in output_stanzas {
            outputs.push(validate_output(name, stanza)?);
        }

        let batch_size = inputs
            .iter()
            .map(|input| input.batch_size)
            .min()
            .unwrap_or_else(default_batch_size);

        Ok(RuntimeConfig {
            inputs,
            outputs,
            worker_pool_size: self.worker_pool_size.max(1),
            queue_depth: self.queue_depth.max(1),
            batch_size: batch_size.max(1),
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        })
    }
}

fn missing(section: &str, option: &str) -> ConfigError {
    ConfigError::MissingOption {
        section: section.to_string(),
        option: option.to_string(),
    }
}

fn validate_input(name: String, stanza: InputStanza) -> Result<InputConfig, ConfigError> {
    if stanza.dial == DialMode::Out {
        return Ok(InputConfig {
            name,
            dial: DialMode::Out,
            address: stanza.address,
            port: stanza.port,
            username: String::new(),
            password: String::new(),
            pem: None,
            compression: false,
            subscription: SubscriptionConfig::DialOut,
            batch_size: stanza.batch_size,
            retry: true,
        });
    }

    let username = stanza.username.ok_or_else(|| missing(&name, "username"))?;
    let password = stanza.password.ok_or_else(|| missing(&name, "password"))?;
    let format = stanza.format.ok_or_else(|| missing(&name, "format"))?;
    let encoding = stanza.encoding.ok_or_else(|| missing(&name, "encoding"))?;

    let subscription = match format {
        InputFormat::Gnmi => {
            if stanza.sensors.is_empty() {
                return Err(missing(&name, "sensors"));
            }
            let sample_interval = stanza
                .sample_interval
                .ok_or_else(|| missing(&name, "sample-interval"))?;
            let mode = stanza
                .subscription_mode
                .ok_or_else(|| missing(&name, "subscription-mode"))?;
            let stream_mode = stanza
                .stream_mode
                .ok_or_else(|| missing(&name, "stream-mode"))?;
            let encoding = parse_enum_option::<GnmiEncoding>(&name, "encoding", &encoding)?;
            SubscriptionConfig::Gnmi {
                sensors: stanza.sensors,
                sample_interval_ns: sample_interval * 1_000_000_000,
                mode,
                stream_mode,
                encoding,
            }
        }
        InputFormat::CiscoEms => {
            if stanza.subscriptions.is_empty() {
                return Err(missing(&name, "subscriptions"));
            }
            let encoding = parse_enum_option::<EmsEncoding>(&name, "encoding", &encoding)?;
            SubscriptionConfig::Ems {
                subscriptions: stanza.subscriptions,
                encoding,
            }
        }
    };

    let pem = match &stanza.pem_file {
        Some(path) => Some(fs::read(path).map_err(|source| ConfigError::PemFile {
            path: path.clone(),
            source,
        })?),
        None => None,
    };

    Ok(InputConfig {
        name,
        dial: DialMode::In,
        address: stanza.address,
        port: stanza.port,
        username,
        password,
        pem,
        compression: stanza.compression,
        subscription,
        batch_size: stanza.batch_size,
        retry: stanza.retry,
    })
}

fn validate_output(name: String, stanza: OutputStanza) -> Result<OutputConfig, ConfigError> {
    let missing_out = |option: &str| ConfigError::MissingOutputOption {
        section: name.clone(),
        option: option.to_string(),
    };

    let (auth, database, org) = match stanza.kind {
        SinkKind::Elasticsearch => {
            let auth = match (stanza.username, stanza.password) {
                (Some(username), Some(password)) => SinkAuth::Basic { username, password },
                _ => SinkAuth::None,
            };
            (auth, None, None)
        }
        SinkKind::Influxdb => {
            let database = stanza.database.ok_or_else(|| missing_out("database"))?;
            let auth = match (stanza.username, stanza.password) {
                (Some(username), Some(password)) => SinkAuth::Basic { username, password },
                _ => SinkAuth::None,
            };
            (auth, Some(database), None)
        }
        SinkKind::Influxdbv2 => {
            let token = stanza.token.ok_or_else(|| missing_out("token"))?;
            let org = stanza.org.ok_or_else(|| missing_out("org"))?;
            let bucket = stanza.bucket.ok_or_else(|| missing_out("bucket"))?;
            (SinkAuth::Token { token }, Some(bucket), Some(org))
        }
    };

    Ok(OutputConfig {
        name,
        kind: stanza.kind,
        address: stanza.address,
        port: stanza.port,
        auth,
        database,
        org,
    })
}

fn parse_enum_option<T: serde::de::DeserializeOwned>(
    section: &str,
    option: &str,
    value: &str,
) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        ConfigError::InvalidOption {
            section: section.to_string(),
            option: option.to_string(),
            value: value.to_string(),
        }
    })
}

use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::Request;
use tracing::{debug, error, info, warn};

use crate::config::data_model::{InputConfig, SubscriptionConfig};
use crate::errors::{ConnectError, ConnectorError, RpcError};
use crate::parser::{RawRecord, TelemetryEncoding};
use crate::path::parse_gnmi_path;
use crate::proto::gnmi::{
    subscribe_request, subscribe_response, GetRequest, SubscribeRequest, Subscription,
    SubscriptionList,
};
use crate::proto::{CreateSubsArgs, GNmiClient, GRpcConfigOperClient};
use crate::supervisor::stats::PipelineStats;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(128);
const CONNECT_DEADLINE: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Devices present their EMS certificate under this name regardless of the
/// address the collector dialed.
const SSL_TARGET_NAME: &str = "ems.cisco.com";

const HOSTNAME_PATH: &str = "Cisco-IOS-XR-shellutil-cfg:host-names";
const HOSTNAME_LEAF: &str = "host-name";
const VERSION_PATH: &str = "Cisco-IOS-XR-install-oper:install/version";
const VERSION_LEAF: &str = "label";
const VERSION_FALLBACK_PATH: &str =
    "openconfig-platform:components/component/state/software-version";
const VERSION_FALLBACK_LEAF: &str = "software-version";

/// Lifecycle of a dial-in connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Subscribed,
    BackingOff,
    Closed,
}

/// A long-lived subscription to one device.
///
/// The connector owns a send-only handle to the raw queue and keeps
/// reconnecting with exponential backoff until it is shut down (or until a
/// failure occurs with `retry` disabled). The device hostname and software
/// version are resolved once on the first successful connect and reused
/// across reconnects.
pub struct DialInConnector {
    config: InputConfig,
    queue: mpsc::Sender<RawRecord>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<PipelineStats>,
    state: ConnectorState,
    hostname: Option<String>,
    version: Option<String>,
    backoff: Duration,
    attempt: u64,
}

impl DialInConnector {
    pub fn new(
        config: InputConfig,
        queue: mpsc::Sender<RawRecord>,
        shutdown: watch::Receiver<bool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            config,
            queue,
            shutdown,
            stats,
            state: ConnectorState::Disconnected,
            hostname: None,
            version: None,
            backoff: MIN_BACKOFF,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Drive the connector until shutdown or a terminal failure.
    pub async fn run(mut self) {
        info!(connector = %self.config.name, address = %self.config.address,
            port = self.config.port, "Starting dial-in connector");

        loop {
            if *self.shutdown.borrow() || self.queue.is_closed() {
                self.state = ConnectorState::Closed;
                break;
            }

            self.state = ConnectorState::Connecting;
            let result = self.connect_and_subscribe().await;

            if *self.shutdown.borrow() {
                self.state = ConnectorState::Closed;
                break;
            }

            let error = match result {
                // The device ended the stream; treat like any other
                // connection loss and go through the retry policy.
                Ok(()) => RpcError::Segment("stream ended by device".to_string()).into(),
                Err(e) => e,
            };

            if !self.config.retry {
                error!(connector = %self.config.name, error = %error,
                    "Connector failed with retry disabled, closing");
                self.state = ConnectorState::Closed;
                break;
            }

            self.state = ConnectorState::BackingOff;
            self.attempt += 1;
            self.stats.note_reconnect();
            let delay = self.next_backoff();
            warn!(connector = %self.config.name, attempt = self.attempt,
                backoff_ms = delay.as_millis() as u64, error = %error,
                "Connection lost, backing off before reconnect");

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    self.state = ConnectorState::Closed;
                    break;
                }
            }
        }

        info!(connector = %self.config.name, "Dial-in connector closed");
    }

    /// Current delay, then double the base up to the cap. Jitter is a
    /// uniform [0, 1) s on top.
    fn next_backoff(&mut self) -> Duration {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
        let delay = self.backoff + jitter;
        self.backoff = min(self.backoff.saturating_mul(2), MAX_BACKOFF);
        delay
    }

    fn reset_backoff(&mut self) {
        self.backoff = MIN_BACKOFF;
        self.attempt = 0;
    }

    async fn connect_and_subscribe(&mut self) -> Result<(), ConnectorError> {
        let channel = self.connect().await?;
        self.discover_device_info(&channel).await?;

        match &self.config.subscription {
            SubscriptionConfig::Gnmi { .. } => self.subscribe_gnmi(channel).await,
            SubscriptionConfig::Ems { .. } => self.subscribe_ems(channel).await,
            SubscriptionConfig::DialOut => unreachable!("dial-out inputs never dial in"),
        }
    }

    async fn connect(&self) -> Result<Channel, ConnectError> {
        let scheme = if self.config.pem.is_some() {
            "https"
        } else {
            "http"
        };
        let url = format!("{scheme}://{}:{}", self.config.address, self.config.port);

        let mut endpoint = Endpoint::from_shared(url.clone())
            .map_err(|source| ConnectError::Endpoint {
                endpoint: url.clone(),
                source,
            })?
            .connect_timeout(CONNECT_DEADLINE)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        if let Some(pem) = &self.config.pem {
            let tls = ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(pem))
                .domain_name(SSL_TARGET_NAME);
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|source| ConnectError::Endpoint {
                    endpoint: url.clone(),
                    source,
                })?;
        }

        debug!(connector = %self.config.name, %url, "Connecting");
        endpoint
            .connect()
            .await
            .map_err(|source| ConnectError::Transport {
                endpoint: url,
                source,
            })
    }

    fn authenticated<T>(&self, message: T) -> Result<Request<T>, RpcError> {
        let mut request = Request::new(message);
        let username: MetadataValue<_> = self
            .config
            .username
            .parse()
            .map_err(|_| RpcError::Metadata { key: "username" })?;
        let password: MetadataValue<_> = self
            .config
            .password
            .parse()
            .map_err(|_| RpcError::Metadata { key: "password" })?;
        request.metadata_mut().insert("username", username);
        request.metadata_mut().insert("password", password);
        Ok(request)
    }

    /// Resolve hostname and software version once per connector lifetime.
    ///
    /// gNMI inputs resolve both so every record carries them; EMS inputs
    /// resolve only the version, since `Telemetry` already names its node.
    async fn discover_device_info(&mut self, channel: &Channel) -> Result<(), ConnectorError> {
        let wants_hostname = matches!(self.config.subscription, SubscriptionConfig::Gnmi { .. });
        if (!wants_hostname || self.hostname.is_some()) && self.version.is_some() {
            debug!(connector = %self.config.name, "Reusing cached device info");
            return Ok(());
        }

        let mut client = GNmiClient::new(channel.clone());

        if wants_hostname && self.hostname.is_none() {
            let hostname = self
                .get_leaf(&mut client, HOSTNAME_PATH, HOSTNAME_LEAF)
                .await?;
            info!(connector = %self.config.name, %hostname, "Resolved device hostname");
            self.hostname = Some(hostname);
        }

        if self.version.is_none() {
            let version = match self.get_leaf(&mut client, VERSION_PATH, VERSION_LEAF).await {
                Ok(version) => version,
                Err(e) => {
                    debug!(connector = %self.config.name, error = %e,
                        "Install version unavailable, trying openconfig");
                    self.get_leaf(&mut client, VERSION_FALLBACK_PATH, VERSION_FALLBACK_LEAF)
                        .await?
                }
            };
            info!(connector = %self.config.name, %version, "Resolved device version");
            self.version = Some(version);
        }

        Ok(())
    }

    /// gNMI `Get` for a single leaf, with a 10-second deadline.
    async fn get_leaf(
        &self,
        client: &mut GNmiClient<Channel>,
        path: &str,
        leaf: &str,
    ) -> Result<String, RpcError> {
        let request = self.authenticated(GetRequest {
            path: vec![parse_gnmi_path(path)],
            ..Default::default()
        })?;

        let response = match tokio::time::timeout(CONNECT_DEADLINE, client.get(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RpcError::Segment(format!(
                    "get for {path} timed out after {}s",
                    CONNECT_DEADLINE.as_secs()
                )))
            }
        };

        for notification in &response.get_ref().notification {
            for update in &notification.update {
                let Some(val) = &update.val else { continue };
                if let Some(found) = leaf_from_value(val, leaf) {
                    return Ok(found);
                }
            }
        }

        Err(RpcError::LeafNotFound {
            path: path.to_string(),
            leaf: leaf.to_string(),
        })
    }

    async fn subscribe_gnmi(&mut self, channel: Channel) -> Result<(), ConnectorError> {
        let SubscriptionConfig::Gnmi {
            sensors,
            sample_interval_ns,
            mode,
            stream_mode,
            encoding,
        } = &self.config.subscription
        else {
            unreachable!("checked by caller");
        };

        let mut client = GNmiClient::new(channel);
        if self.config.compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        let subscriptions = sensors
            .iter()
            .map(|sensor| Subscription {
                path: Some(parse_gnmi_path(sensor)),
                mode: mode.to_proto() as i32,
                sample_interval: *sample_interval_ns,
                ..Default::default()
            })
            .collect();
        let subscribe = SubscriptionList {
            subscription: subscriptions,
            mode: stream_mode.to_proto() as i32,
            encoding: encoding.to_proto() as i32,
            ..Default::default()
        };
        let request = self.authenticated(tokio_stream::once(SubscribeRequest {
            request: Some(subscribe_request::Request::Subscribe(subscribe)),
        }))?;

        let mut stream = client
            .subscribe(request)
            .await
            .map_err(RpcError::Status)?
            .into_inner();

        self.state = ConnectorState::Subscribed;
        self.reset_backoff();
        info!(connector = %self.config.name, "gNMI subscription established");

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                message = stream.message() => match message {
                    Ok(Some(response)) => self.enqueue_gnmi(response).await?,
                    Ok(None) => return Ok(()),
                    Err(status) => return Err(RpcError::Status(status).into()),
                },
            }
        }
    }

    async fn enqueue_gnmi(
        &self,
        response: crate::proto::SubscribeResponse,
    ) -> Result<(), ConnectorError> {
        match &response.response {
            Some(subscribe_response::Response::Error(e)) => {
                return Err(RpcError::Segment(e.message.clone()).into());
            }
            Some(subscribe_response::Response::SyncResponse(_)) => {
                debug!(connector = %self.config.name, "Initial sync complete");
                return Ok(());
            }
            _ => {}
        }

        // The payload stays opaque to the pipeline until a worker decodes
        // it, so hand over the re-encoded message bytes.
        let record = RawRecord {
            encoding: TelemetryEncoding::Gnmi,
            payload: response.encode_to_vec(),
            hostname: self.hostname.clone(),
            version: self.version.clone(),
            peer: self.config.address.clone(),
        };
        self.forward(record).await;
        Ok(())
    }

    async fn subscribe_ems(&mut self, channel: Channel) -> Result<(), ConnectorError> {
        let SubscriptionConfig::Ems {
            subscriptions,
            encoding,
        } = &self.config.subscription
        else {
            unreachable!("checked by caller");
        };

        let mut client = GRpcConfigOperClient::new(channel);
        if self.config.compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        let request = self.authenticated(CreateSubsArgs {
            req_id: 1,
            encode: encoding.wire_value(),
            subscriptions: subscriptions.clone(),
        })?;

        let mut stream = client
            .create_subs(request)
            .await
            .map_err(RpcError::Status)?
            .into_inner();

        self.state = ConnectorState::Subscribed;
        self.reset_backoff();
        info!(connector = %self.config.name, "EMS subscription established");

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                message = stream.message() => match message {
                    Ok(Some(segment)) => {
                        if !segment.errors.is_empty() {
                            return Err(RpcError::Segment(segment.errors).into());
                        }
                        let record = RawRecord {
                            encoding: TelemetryEncoding::Ems,
                            payload: segment.data,
                            hostname: None,
                            version: self.version.clone(),
                            peer: self.config.address.clone(),
                        };
                        self.forward(record).await;
                    }
                    Ok(None) => return Ok(()),
                    Err(status) => return Err(RpcError::Status(status).into()),
                },
            }
        }
    }

    async fn forward(&self, record: RawRecord) {
        if self.queue.send(record).await.is_err() {
            warn!(connector = %self.config.name, "Raw record queue closed");
        } else {
            self.stats.note_enqueued();
        }
    }
}

/// Pull a named leaf out of a `Get` response value. Devices answer either
/// with the scalar itself or with a JSON subtree containing it.
fn leaf_from_value(val: &crate::proto::TypedValue, leaf: &str) -> Option<String> {
    use crate::proto::typed_value::Value as V;

    match &val.value {
        Some(V::StringVal(s)) | Some(V::AsciiVal(s)) => Some(s.clone()),
        Some(V::JsonVal(bytes)) | Some(V::JsonIetfVal(bytes)) => {
            let parsed: serde_json::Value = serde_json::from_slice(bytes).ok()?;
            json_find(&parsed, leaf).map(|found| match found {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        _ => None,
    }
}

fn json_find<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return Some(found);
            }
            map.values().find_map(|child| json_find(child, key))
        }
        serde_json::Value::Array(items) => items.iter().find_map(|child| json_find(child, key)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The deterministic part of the schedule: 1, 2, 4, ... capped at 128.
    #[test]
    fn backoff_doubles_to_cap_and_resets() {
        let mut backoff = MIN_BACKOFF;
        let mut observed = Vec::new();
        for _ in 0..10 {
            observed.push(backoff);
            backoff = min(backoff.saturating_mul(2), MAX_BACKOFF);
        }
        let seconds: Vec<u64> = observed.iter().map(Duration::as_secs).collect();
        assert_eq!(seconds, vec![1, 2, 4, 8, 16, 32, 64, 128, 128, 128]);
    }

    #[test]
    fn json_find_descends_nested_objects() {
        let doc: serde_json::Value = serde_json::from_str(
            r#"{"Cisco-IOS-XR-shellutil-cfg:host-names": {"host-name": "core-1"}}"#,
        )
        .unwrap();
        assert_eq!(
            json_find(&doc, "host-name"),
            Some(&serde_json::Value::String("core-1".to_string()))
        );
    }
}

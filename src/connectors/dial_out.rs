use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Buf;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::data_model::InputConfig;
use crate::parser::{RawRecord, TelemetryEncoding};
use crate::supervisor::stats::PipelineStats;

/// Frame header: msg_type, encode_type, msg_version, flags (i16 each) and
/// msg_length (i32), all big-endian.
const HEADER_SIZE: usize = 12;

/// TCP server accepting device-initiated telemetry streams.
///
/// Each connection carries a sequence of frames: the 12-byte header above
/// followed by exactly `msg_length` payload bytes. Every frame becomes one
/// raw record on the shared queue; the payload is never decoded here. A
/// malformed header tears down that connection only.
pub struct DialOutServer {
    name: String,
    listener: TcpListener,
    queue: mpsc::Sender<RawRecord>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<PipelineStats>,
}

impl DialOutServer {
    /// Bind the configured address. A bind failure is fatal at startup.
    pub fn bind(
        config: &InputConfig,
        queue: mpsc::Sender<RawRecord>,
        shutdown: watch::Receiver<bool>,
        stats: Arc<PipelineStats>,
    ) -> std::io::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.address, config.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;

        info!(server = %config.name, %addr, "Dial-out listener bound");
        Ok(Self {
            name: config.name.clone(),
            listener,
            queue,
            shutdown,
            stats,
        })
    }

    /// Address actually bound, useful when the port was 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(server = %self.name, %peer, "Accepted dial-out connection");
                        let handler = ConnectionHandler {
                            server: self.name.clone(),
                            queue: self.queue.clone(),
                            shutdown: self.shutdown.clone(),
                            stats: Arc::clone(&self.stats),
                        };
                        tokio::spawn(handler.handle(stream, peer));
                    }
                    Err(e) => {
                        warn!(server = %self.name, error = %e, "Accept failed");
                    }
                },
            }
        }
        info!(server = %self.name, "Dial-out listener closed");
    }
}

struct ConnectionHandler {
    server: String,
    queue: mpsc::Sender<RawRecord>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<PipelineStats>,
}

impl ConnectionHandler {
    async fn handle(mut self, mut stream: TcpStream, peer: SocketAddr) {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.changed() => break,
                frame = read_frame(&mut stream) => frame,
            };

            match frame {
                Ok(Some(payload)) => {
                    let record = RawRecord {
                        encoding: TelemetryEncoding::Ems,
                        payload,
                        hostname: None,
                        version: None,
                        peer: peer.ip().to_string(),
                    };
                    if self.queue.send(record).await.is_err() {
                        warn!(server = %self.server, %peer, "Raw record queue closed");
                        break;
                    }
                    self.stats.note_enqueued();
                }
                Ok(None) => {
                    debug!(server = %self.server, %peer, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    error!(server = %self.server, %peer, error = %e,
                        "Dropping connection");
                    break;
                }
            }
        }
    }
}

/// Read one frame. `Ok(None)` is a clean end-of-stream at a frame boundary.
async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut fields = &header[..];
    let _msg_type = fields.get_i16();
    let encode_type = fields.get_i16();
    let _msg_version = fields.get_i16();
    let _flags = fields.get_i16();
    let msg_length = fields.get_i32();

    // 1 = gpb, 2 = json; anything else is a corrupt or misframed stream.
    if !(1..=2).contains(&encode_type) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown encode_type {encode_type} in frame header"),
        ));
    }
    if msg_length < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("negative frame length {msg_length}"),
        ));
    }

    // read_exact loops internally until the whole payload has arrived.
    let mut payload = vec![0u8; msg_length as usize];
    stream.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

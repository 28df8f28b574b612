//! Single-slot inter-process channel between the collector and the
//! transformer.
//!
//! Strictly best-effort: `publish` overwrites a one-frame slot, so a slow
//! subscriber silently misses superseded ticks. One subscriber is served at
//! a time; a well-behaved subscriber never writes, so any inbound bytes (or
//! EOF) signal a broken connection and trigger a re-accept.

use crate::model::Snapshot;
use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Control code published when service hours end.
pub const END_OF_SERVICE: u8 = 0;
/// Control code published when service hours begin again.
pub const START_OF_SERVICE: u8 = 1;

/// One channel frame: a tick's telemetry or a day-boundary control code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Snapshot(Snapshot),
    Control(u8),
}

const SEND_INTERVAL: Duration = Duration::from_millis(500);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

fn encode_frame(message: &Message) -> Result<Bytes> {
    let body = serde_json::to_vec(message)?;
    anyhow::ensure!(
        body.len() <= MAX_FRAME_BYTES,
        "channel frame too large: {} bytes",
        body.len()
    );
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

async fn read_frame(stream: &mut TcpStream) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_BYTES, "oversized channel frame: {} bytes", len);

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

struct PublisherInner {
    listener: TcpListener,
    slot: Mutex<Option<Bytes>>,
}

/// Producer side. `bind` once, spawn `run`, then `publish` from the poll
/// loop.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl Publisher {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr, "Channel listening");
        Ok(Self {
            inner: Arc::new(PublisherInner {
                listener,
                slot: Mutex::new(None),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.inner.listener.local_addr()?)
    }

    /// Replaces the pending frame. A previous frame the subscriber has not
    /// consumed yet is lost, not queued.
    pub async fn publish(&self, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;
        *self.inner.slot.lock().await = Some(frame);
        Ok(())
    }

    /// Accept/send loop. Serves one subscriber until the connection breaks,
    /// then accepts the next.
    pub async fn run(self) {
        loop {
            let (mut stream, peer) = match self.inner.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Channel accept failed");
                    tokio::time::sleep(SEND_INTERVAL).await;
                    continue;
                }
            };
            info!(peer = %peer, "Channel subscriber connected");
            self.serve(&mut stream).await;
            info!(peer = %peer, "Channel subscriber lost");
        }
    }

    async fn serve(&self, stream: &mut TcpStream) {
        let mut probe = [0u8; 32];
        loop {
            tokio::time::sleep(SEND_INTERVAL).await;

            // Inbound bytes and EOF both mean the subscriber is gone.
            match stream.try_read(&mut probe) {
                Ok(_) => return,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => return,
            }

            let pending = self.inner.slot.lock().await.take();
            if let Some(frame) = pending {
                if let Err(e) = stream.write_all(&frame).await {
                    warn!(error = %e, "Channel send failed");
                    // Keep the frame for the next subscriber unless a newer
                    // one has already replaced it.
                    let mut slot = self.inner.slot.lock().await;
                    if slot.is_none() {
                        *slot = Some(frame);
                    }
                    return;
                }
            }
        }
    }
}

/// Consumer side. `recv` transparently (re)connects with a fixed backoff,
/// so the caller only ever sees whole frames.
pub struct Subscriber {
    addr: String,
    stream: Option<TcpStream>,
}

impl Subscriber {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
        }
    }

    async fn connect(&mut self) {
        loop {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    info!(addr = %self.addr, "Channel connected");
                    self.stream = Some(stream);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, addr = %self.addr, "Channel connect failed, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }

    pub async fn recv(&mut self) -> Message {
        loop {
            if self.stream.is_none() {
                self.connect().await;
            }
            let result = match self.stream.as_mut() {
                Some(stream) => read_frame(stream).await,
                None => continue,
            };
            match result {
                Ok(message) => return message,
                Err(e) => {
                    warn!(error = %e, "Channel receive failed, reconnecting");
                    self.stream = None;
                }
            }
        }
    }
}

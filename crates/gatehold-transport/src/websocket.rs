//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each accepted socket is split in two. The read half stays with the
//! connection and is polled by the per-connection driver through
//! [`WebSocketConnection::recv`]. The write half moves into a writer task
//! fed by an unbounded channel, which is what lets
//! [`LoginConnection::send`] stay synchronous: it only queues.
//!
//! Encryption is switched on through the same channel, so every packet
//! queued before [`LoginConnection::enable_encryption`] still leaves in
//! the clear, and every packet after it is encrypted.

use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gatehold_protocol::{ClientPacket, Codec, JsonCodec, Notice, ServerPacket};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    CipherPair, ConnectionId, LoginConnection, StreamCipher, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based listener for incoming login connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming connection.
    ///
    /// Must be called from within a Tokio runtime: the connection's writer
    /// task is spawned here.
    pub async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id =
            ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(id, sink, rx));

        Ok(WebSocketConnection {
            id,
            addr,
            outbound,
            inbound: Mutex::new(stream),
            decrypt: StdMutex::new(None),
            compression: StdMutex::new(None),
            open: AtomicBool::new(true),
        })
    }
}

/// Work items for the writer task.
enum Outbound {
    Frame(Vec<u8>),
    Encrypt(Box<dyn StreamCipher>),
    Close,
}

/// Drains the outbound queue into the socket until closed.
async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut cipher: Option<Box<dyn StreamCipher>> = None;

    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(mut bytes) => {
                if let Some(cipher) = cipher.as_mut() {
                    cipher.apply(&mut bytes);
                }
                if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                    tracing::debug!(%id, error = %e, "websocket write failed");
                    break;
                }
            }
            Outbound::Encrypt(next) => cipher = Some(next),
            Outbound::Close => {
                if let Err(e) = sink.close().await {
                    tracing::debug!(%id, error = %e, "websocket close failed");
                }
                break;
            }
        }
    }

    tracing::trace!(%id, "websocket writer finished");
}

/// A single WebSocket login connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: Mutex<SplitStream<WsStream>>,
    decrypt: StdMutex<Option<Box<dyn StreamCipher>>>,
    compression: StdMutex<Option<u32>>,
    open: AtomicBool,
}

impl WebSocketConnection {
    /// Receives the next packet from the client.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    pub async fn recv(&self) -> Result<Option<ClientPacket>, TransportError> {
        loop {
            let msg = self.inbound.lock().await.next().await;
            let mut bytes = match msg {
                Some(Ok(Message::Binary(data))) => data.to_vec(),
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    self.open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            };

            if let Some(cipher) = self
                .decrypt
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_mut()
            {
                cipher.apply(&mut bytes);
            }

            return Ok(Some(JsonCodec.decode(&bytes)?));
        }
    }

    /// The compression threshold negotiated for this link, if any.
    ///
    /// WebSocket frames are compressed by the `permessage-deflate`
    /// extension when the peer offers it, so the threshold is recorded
    /// for the game protocol layer rather than applied here.
    pub fn compression_threshold(&self) -> Option<u32> {
        *self.compression.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn queue(&self, item: Outbound) -> Result<(), TransportError> {
        self.outbound.send(item).map_err(|_| {
            self.open.store(false, Ordering::SeqCst);
            TransportError::ConnectionClosed("writer task has stopped".into())
        })
    }
}

impl LoginConnection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }

    fn is_loopback(&self) -> bool {
        false
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    fn send(&self, packet: ServerPacket) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} is closed",
                self.id
            )));
        }
        let bytes = JsonCodec.encode(&packet)?;
        self.queue(Outbound::Frame(bytes))
    }

    fn close(&self, reason: &Notice) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(id = %self.id, %reason, "closing websocket connection");
        // The writer may already be gone if the peer hung up first.
        let _ = self.outbound.send(Outbound::Close);
        Ok(())
    }

    fn enable_encryption(
        &self,
        ciphers: CipherPair,
    ) -> Result<(), TransportError> {
        let CipherPair { decrypt, encrypt } = ciphers;
        *self.decrypt.lock().unwrap_or_else(|e| e.into_inner()) = Some(decrypt);
        self.queue(Outbound::Encrypt(encrypt))
    }

    fn set_compression(&self, threshold: u32) -> Result<(), TransportError> {
        *self.compression.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(threshold);
        tracing::debug!(id = %self.id, threshold, "compression threshold set");
        Ok(())
    }
}

//! In-process connection: the loopback link a single-player host uses to
//! talk to its own embedded server.
//!
//! Nothing is serialized. Sent packets are kept in a queue that the other
//! end drains with [`MemoryConnection::take_sent`], which also makes this
//! the transport every login test runs on.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use gatehold_protocol::{Notice, ServerPacket};

use crate::{CipherPair, ConnectionId, LoginConnection, TransportError};

/// Memory connections get ids from their own range so they never collide
/// with network connection ids in logs.
static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1 << 48);

/// A connection that lives entirely inside the process.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    loopback: bool,
    open: AtomicBool,
    fail_sends: AtomicBool,
    encrypted: AtomicBool,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    sent: Vec<ServerPacket>,
    close_reason: Option<Notice>,
    compression: Option<u32>,
}

impl MemoryConnection {
    /// A loopback link, as used by an integrated single-player server.
    pub fn loopback() -> Self {
        Self::with_flags(None, true)
    }

    /// A link that reports itself as a real network socket from `addr`.
    ///
    /// Lets tests drive the encrypted login path without opening a socket.
    pub fn network(addr: SocketAddr) -> Self {
        Self::with_flags(Some(addr), false)
    }

    fn with_flags(remote_addr: Option<SocketAddr>, loopback: bool) -> Self {
        Self {
            id: ConnectionId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)),
            remote_addr,
            loopback,
            open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            encrypted: AtomicBool::new(false),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Makes every later `send` fail, simulating a broken pipe.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Drains and returns every packet sent so far.
    pub fn take_sent(&self) -> Vec<ServerPacket> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Returns a copy of every packet sent so far without draining.
    pub fn sent(&self) -> Vec<ServerPacket> {
        self.lock().sent.clone()
    }

    /// The reason passed to [`close`](LoginConnection::close), if any.
    pub fn close_reason(&self) -> Option<Notice> {
        self.lock().close_reason.clone()
    }

    /// `true` once encryption has been enabled.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted.load(Ordering::SeqCst)
    }

    /// The compression threshold, if compression was enabled.
    pub fn compression_threshold(&self) -> Option<u32> {
        self.lock().compression
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test thread panicked mid-push; the
        // recorded packets are still meaningful.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LoginConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn is_loopback(&self) -> bool {
        self.loopback
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, packet: ServerPacket) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(
                "memory connection already closed".into(),
            ));
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated send failure",
            )));
        }
        self.lock().sent.push(packet);
        Ok(())
    }

    fn close(&self, reason: &Notice) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.lock().close_reason = Some(reason.clone());
            tracing::debug!(conn_id = %self.id, %reason, "memory connection closed");
        }
        Ok(())
    }

    fn enable_encryption(
        &self,
        _ciphers: CipherPair,
    ) -> Result<(), TransportError> {
        self.encrypted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_compression(&self, threshold: u32) -> Result<(), TransportError> {
        self.lock().compression = Some(threshold);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_has_no_remote_addr() {
        let conn = MemoryConnection::loopback();
        assert!(conn.is_loopback());
        assert!(conn.remote_addr().is_none());
        assert!(conn.is_open());
    }

    #[test]
    fn test_network_reports_address() {
        let addr: SocketAddr = "203.0.113.7:25565".parse().unwrap();
        let conn = MemoryConnection::network(addr);
        assert!(!conn.is_loopback());
        assert_eq!(conn.remote_addr(), Some(addr));
    }

    #[test]
    fn test_send_records_packets_in_order() {
        let conn = MemoryConnection::loopback();
        conn.send(ServerPacket::EnableCompression { threshold: 1 })
            .unwrap();
        conn.send(ServerPacket::SystemChat {
            message: Notice::LoadingStateError,
        })
        .unwrap();

        let sent = conn.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], ServerPacket::EnableCompression { .. }));
        assert!(conn.take_sent().is_empty(), "take_sent drains");
    }

    #[test]
    fn test_send_after_close_fails() {
        let conn = MemoryConnection::loopback();
        conn.close(&Notice::SlowLogin).unwrap();

        let result = conn.send(ServerPacket::EnableCompression { threshold: 1 });
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[test]
    fn test_close_keeps_first_reason() {
        let conn = MemoryConnection::loopback();
        conn.close(&Notice::SlowLogin).unwrap();
        conn.close(&Notice::ProtocolError).unwrap();

        assert!(!conn.is_open());
        assert_eq!(conn.close_reason(), Some(Notice::SlowLogin));
    }

    #[test]
    fn test_fail_sends_simulates_broken_pipe() {
        let conn = MemoryConnection::loopback();
        conn.fail_sends(true);
        let result = conn.send(ServerPacket::EnableCompression { threshold: 1 });
        assert!(matches!(result, Err(TransportError::SendFailed(_))));
        assert!(conn.sent().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = MemoryConnection::loopback();
        let b = MemoryConnection::loopback();
        assert_ne!(a.id(), b.id());
    }
}

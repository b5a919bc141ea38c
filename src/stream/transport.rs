//! Transport sink: a connectionless UDP socket aimed at one destination.
//!
//! The destination is resolved once when the sink opens. The socket stays
//! unconnected so ICMP "port unreachable" replies never surface as errors on
//! later sends; delivery is fire-and-forget.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TransportError;

/// Outbound datagram socket with an idempotent close.
#[derive(Debug)]
pub struct UdpSink {
    target: SocketAddr,
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpSink {
    /// Resolve `host:port` and bind an ephemeral local socket.
    pub fn open(host: &str, port: u16) -> Result<Self, TransportError> {
        let target = resolve(host, port)?;
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).map_err(TransportError::Bind)?;

        debug!(
            target = %target,
            local = ?socket.local_addr().ok(),
            "UdpSink opened"
        );

        Ok(Self {
            target,
            socket: Mutex::new(Some(socket)),
        })
    }

    /// Resolved destination.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one datagram. Any failure is final for the session using this sink.
    pub fn send(&self, payload: &[u8]) -> Result<usize, TransportError> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(TransportError::Closed)?;
        let sent = socket
            .send_to(payload, self.target)
            .map_err(|source| TransportError::Send {
                target: self.target,
                source,
            })?;
        trace!(target = %self.target, bytes = sent, "datagram sent");
        Ok(sent)
    }

    /// Release the socket. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let closed = self.socket.lock().take().is_some();
        if closed {
            debug!(target = %self.target, "UdpSink closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.socket.lock().is_none()
    }
}

/// Resolve a destination, preferring IPv4 when both families are offered.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| TransportError::NoAddress(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_send_reaches_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let sink = UdpSink::open("127.0.0.1", port).unwrap();
        assert_eq!(sink.send(b"hello").unwrap(), 5);

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn test_send_without_receiver_is_ok() {
        let sink = UdpSink::open("127.0.0.1", 19997).unwrap();
        for _ in 0..3 {
            assert!(sink.send(b"{}").is_ok());
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let sink = UdpSink::open("localhost", 19996).unwrap();
        assert!(sink.close());
        assert!(!sink.close());
        assert!(sink.is_closed());
        assert!(matches!(sink.send(b"x"), Err(TransportError::Closed)));
    }

    #[test]
    fn test_unresolvable_host() {
        let err = UdpSink::open("no-such-host.invalid", 8080).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Resolve { .. } | TransportError::NoAddress(_)
        ));
    }
}

//! Datagram transports.
//!
//! [`RequestChannel`](crate::channel::RequestChannel) only needs to send a
//! datagram and receive the next one; the timeout lives in the channel.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{ToSocketAddrs, UdpSocket, lookup_host};
use tracing::{debug, trace};

/// A connectionless, unreliable datagram pipe to one server.
pub trait DatagramTransport: Send {
    /// Sends one datagram to the server.
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Waits for the next datagram and copies it into `buf`.
    ///
    /// Must be cancel safe: dropping the future before it completes loses no
    /// datagram.
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// UDP socket bound to an ephemeral local port, sending to a fixed server.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    server: SocketAddr,
}

impl UdpTransport {
    /// Resolves `server` and binds a socket of the matching address family.
    pub async fn connect(server: impl ToSocketAddrs) -> io::Result<Self> {
        let server = lookup_host(server).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "server address did not resolve")
        })?;
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        debug!(local = %socket.local_addr()?, %server, "udp transport ready");
        Ok(Self { socket, server })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramTransport for UdpTransport {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.server).await?;
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Unconnected: ICMP unreachable never surfaces here, a dead server
        // just looks silent.
        let (len, from) = self.socket.recv_from(buf).await?;
        trace!(%from, len, "datagram received");
        Ok(len)
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! In-memory transport for deterministic tests under a paused clock.

    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::*;

    type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

    /// Replies to each sent datagram with whatever `responder` returns and
    /// lets the test inject extra datagrams through [`ScriptedTransport::injector`].
    pub(crate) struct ScriptedTransport {
        responder: Responder,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        inbox_tx: mpsc::UnboundedSender<Vec<u8>>,
        inbox_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) -> Self {
            let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
            Self {
                responder: Box::new(responder),
                sent: Arc::default(),
                inbox_tx,
                inbox_rx,
            }
        }

        /// A transport that never answers.
        pub(crate) fn silent() -> Self {
            Self::new(|_| Vec::new())
        }

        pub(crate) fn sent(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
            self.sent.clone()
        }

        pub(crate) fn injector(&self) -> mpsc::UnboundedSender<Vec<u8>> {
            self.inbox_tx.clone()
        }
    }

    impl DatagramTransport for ScriptedTransport {
        async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
            self.sent.lock().unwrap().push(datagram.to_vec());
            for reply in (self.responder)(datagram) {
                let _ = self.inbox_tx.send(reply);
            }
            Ok(())
        }

        async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbox_rx.recv().await {
                Some(datagram) => {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    Ok(len)
                }
                // Sender half lives in self, so this never closes.
                None => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_transport_sends_to_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut transport = UdpTransport::connect(server.local_addr().unwrap())
            .await
            .unwrap();
        assert!(transport.local_addr().unwrap().is_ipv4());

        transport.send(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");

        server.send_to(b"pong", from).await.unwrap();
        let len = transport.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"pong");
    }

    #[tokio::test]
    async fn unresolvable_host_is_an_error() {
        let result = UdpTransport::connect("no-such-host.invalid:2222").await;
        assert!(result.is_err());
    }
}

//! Message transport boundary
//!
//! The sync protocol only needs two things from its transport: send an
//! addressed, typed-argument message, and hand inbound messages to a
//! handler. Everything else (pacing, ordering, loss tolerance) is the hub's
//! job. The production transport is plain UDP, one OSC message per
//! datagram, best-effort by design: a failed send is logged and dropped,
//! never retried.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use patchproto::OscMessage;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outbound half of the transport boundary.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message to `to`. Best-effort: an error means the datagram
    /// never left this host, not that it failed to arrive.
    async fn send(&self, to: SocketAddr, msg: &OscMessage) -> std::io::Result<()>;

    /// The address this transport is bound on (used for co-location checks).
    fn local_addr(&self) -> SocketAddr;
}

/// UDP transport: one OSC content message per datagram.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
}

impl UdpTransport {
    /// Bind a socket on `addr`. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local = socket.local_addr()?;
        info!(%local, "udp transport bound");
        Ok(Self {
            socket: Arc::new(socket),
            local,
        })
    }

    /// Spawn the receive loop. Every decodable datagram is forwarded to
    /// `tx` with its source address; undecodable ones are dropped with a
    /// debug log. The task ends when the receiving side hangs up.
    pub fn spawn_receiver(
        &self,
        tx: mpsc::Sender<(SocketAddr, OscMessage)>,
    ) -> JoinHandle<()> {
        let socket = self.socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => match OscMessage::decode(&buf[..len]) {
                        Ok(msg) => {
                            if tx.send((from, msg)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(%from, error = %e, "dropping undecodable datagram"),
                    },
                    Err(e) => warn!(error = %e, "udp receive error"),
                }
            }
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: SocketAddr, msg: &OscMessage) -> std::io::Result<()> {
        self.socket.send_to(&msg.encode(), to).await.map(|_| ())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchproto::OscArg;

    #[tokio::test]
    async fn datagram_roundtrip_on_loopback() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let _receiver = server.spawn_receiver(tx);

        let msg = OscMessage::with_args(
            "/patchline/connect",
            vec![OscArg::from("a:out"), OscArg::from("b:in")],
        );
        client.send(server.local_addr(), &msg).await.unwrap();

        let (from, received) = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, client.local_addr());
        assert_eq!(received, msg);
    }
}

//! Burst pacing
//!
//! The transport has no flow control of its own, so a large burst (initial
//! sync, full rebuild) can overrun the receiver's socket buffer and lose
//! datagrams silently. The controller spaces a burst out instead: after
//! every `batch_size` messages it closes the burst bracket, sleeps `pause`,
//! and reopens it, so the receiver is assumed to drain faster than messages
//! can pile up. No budget carries over between bursts.

use std::net::SocketAddr;
use std::time::Duration;

use patchconf::SyncConfig;
use patchproto::catalog::GuiMessage;
use patchproto::OscMessage;
use tracing::debug;

use crate::transport::Transport;

/// Messages sent between pauses.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Pause between batches.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(20);

/// Paces one burst of messages to one observer.
#[derive(Debug, Clone, Copy)]
pub struct FlowController {
    batch_size: usize,
    pause: Duration,
}

impl Default for FlowController {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pause: DEFAULT_PAUSE,
        }
    }
}

impl FlowController {
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.batch_size, Duration::from_millis(config.pause_ms))
    }

    /// Send `msgs` to `to`, bracketed by `big_packets` markers and paused
    /// after every batch. Individual send failures are logged and skipped;
    /// the transport is best-effort and the burst keeps going.
    pub async fn pace(&self, transport: &dyn Transport, to: SocketAddr, msgs: &[OscMessage]) {
        self.send_one(transport, to, marker(true)).await;

        for (n, msg) in msgs.iter().enumerate() {
            self.send_one(transport, to, msg.clone()).await;

            if (n + 1) % self.batch_size == 0 {
                self.send_one(transport, to, marker(false)).await;
                tokio::time::sleep(self.pause).await;
                self.send_one(transport, to, marker(true)).await;
            }
        }

        self.send_one(transport, to, marker(false)).await;
    }

    async fn send_one(&self, transport: &dyn Transport, to: SocketAddr, msg: OscMessage) {
        if let Err(e) = transport.send(to, &msg).await {
            debug!(%to, path = %msg.path, error = %e, "paced send failed");
        }
    }
}

fn marker(begin: bool) -> OscMessage {
    GuiMessage::BigPackets { begin }.into_osc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patchproto::catalog::GUI_BIG_PACKETS;
    use std::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<OscMessage>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn paths(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.path.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, _to: SocketAddr, msg: &OscMessage) -> std::io::Result<()> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }

        fn local_addr(&self) -> SocketAddr {
            "127.0.0.1:0".parse().unwrap()
        }
    }

    fn item(n: usize) -> OscMessage {
        OscMessage::new(format!("/item/{n}"))
    }

    #[tokio::test]
    async fn burst_is_bracketed() {
        let transport = RecordingTransport::new();
        let flow = FlowController::new(50, Duration::from_millis(0));
        let to = "127.0.0.1:9".parse().unwrap();

        flow.pace(&transport, to, &[item(0), item(1)]).await;

        let paths = transport.paths();
        assert_eq!(paths.first().map(String::as_str), Some(GUI_BIG_PACKETS));
        assert_eq!(paths.last().map(String::as_str), Some(GUI_BIG_PACKETS));
        assert_eq!(paths.len(), 4);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].int(0), Some(0));
        assert_eq!(sent[3].int(0), Some(1));
    }

    #[tokio::test]
    async fn pause_markers_every_batch() {
        let transport = RecordingTransport::new();
        let flow = FlowController::new(2, Duration::from_millis(0));
        let to = "127.0.0.1:9".parse().unwrap();

        flow.pace(&transport, to, &[item(0), item(1), item(2), item(3), item(4)])
            .await;

        // begin, 2 items, end/begin, 2 items, end/begin, 1 item, end
        let expected = vec![
            (GUI_BIG_PACKETS, Some(0)),
            ("/item/0", None),
            ("/item/1", None),
            (GUI_BIG_PACKETS, Some(1)),
            (GUI_BIG_PACKETS, Some(0)),
            ("/item/2", None),
            ("/item/3", None),
            (GUI_BIG_PACKETS, Some(1)),
            (GUI_BIG_PACKETS, Some(0)),
            ("/item/4", None),
            (GUI_BIG_PACKETS, Some(1)),
        ];
        let sent = transport.sent.lock().unwrap();
        let got: Vec<(&str, Option<i32>)> = sent
            .iter()
            .map(|m| (m.path.as_str(), m.int(0)))
            .collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn empty_burst_still_brackets() {
        let transport = RecordingTransport::new();
        let flow = FlowController::default();
        let to = "127.0.0.1:9".parse().unwrap();

        flow.pace(&transport, to, &[]).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].int(0), Some(0));
        assert_eq!(sent[1].int(0), Some(1));
    }
}

//! End-to-end observer synchronization over real loopback UDP
//!
//! Drives a full daemon (transport, dispatch, store, hub) from both sides:
//! a scripted graph source feeding events in, and a scratch UDP socket
//! playing the observer. Exercises both delivery strategies, live fan-out,
//! the request paths, and idle shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use patchconf::SyncConfig;
use patchline::daemon::Daemon;
use patchline::graph::PortKind;
use patchline::source::{NullSource, SourceEvent};
use patchline::sync::SyncHub;
use patchline::transport::{Transport, UdpTransport};
use patchproto::catalog::{
    GUI_ANNOUNCE_ACK, GUI_BIG_PACKETS, GUI_CONNECTION_ADDED, GUI_CONNECTION_REMOVED,
    GUI_DSP_LOAD, GUI_FAST_TEMP_FILE, GUI_PORT_ADDED, GUI_PORT_REMOVED, REQ_ANNOUNCE,
    REQ_DISANNOUNCE, REQ_PORT_SET_ALIAS, REQ_REFRESH,
};
use patchproto::{OscArg, OscMessage, SnapshotDocument};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Harness {
    daemon_addr: SocketAddr,
    source_tx: mpsc::Sender<SourceEvent>,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_daemon(force_remote: bool, exit_when_idle: bool, spool: &Path) -> Harness {
    let transport = Arc::new(
        UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap(),
    );
    let daemon_addr = transport.local_addr();

    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    transport.spawn_receiver(inbound_tx);

    let mut hub = SyncHub::new(transport.clone(), &SyncConfig::default(), spool.to_path_buf());
    if force_remote {
        hub = hub.with_same_host_check(|_, _| false);
    }

    let (source_tx, source_rx) = mpsc::channel(256);
    let shutdown = CancellationToken::new();
    let daemon = Daemon::new(hub, Arc::new(NullSource));
    let handle = tokio::spawn(daemon.run(source_rx, inbound_rx, shutdown.clone(), exit_when_idle));

    Harness {
        daemon_addr,
        source_tx,
        shutdown,
        handle,
    }
}

/// Seed the standard test graph: a synth with a stereo pair, a hardware
/// playback port, one connection.
async fn seed_graph(harness: &Harness) {
    let events = [
        SourceEvent::Started {
            sample_rate: 48_000,
            buffer_size: 1_024,
        },
        SourceEvent::PortAppeared {
            name: "synth:out_l".into(),
            kind: PortKind::Audio,
            flags: 0x2,
        },
        SourceEvent::PortAppeared {
            name: "synth:out_r".into(),
            kind: PortKind::Audio,
            flags: 0x2,
        },
        SourceEvent::PortAppeared {
            name: "system:playback_1".into(),
            kind: PortKind::Audio,
            flags: 0x5,
        },
        SourceEvent::ConnectionAppeared {
            port_out: "synth:out_l".into(),
            port_in: "system:playback_1".into(),
        },
    ];
    for event in events {
        harness.source_tx.send(event).await.unwrap();
    }
    // let the processing loop drain the seed before observers show up
    tokio::time::sleep(Duration::from_millis(200)).await;
}

struct Observer {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl Observer {
    async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            buf: vec![0u8; 65_536],
        }
    }

    async fn send(&self, to: SocketAddr, msg: OscMessage) {
        self.socket.send_to(&msg.encode(), to).await.unwrap();
    }

    async fn recv(&mut self) -> OscMessage {
        let (len, _) = tokio::time::timeout(
            Duration::from_secs(5),
            self.socket.recv_from(&mut self.buf),
        )
        .await
        .expect("timed out waiting for daemon message")
        .unwrap();
        OscMessage::decode(&self.buf[..len]).unwrap()
    }
}

#[tokio::test]
async fn local_observer_sync_lifecycle() {
    let spool = tempfile::tempdir().unwrap();
    let harness = start_daemon(false, true, spool.path()).await;
    seed_graph(&harness).await;

    let mut observer = Observer::bind().await;
    observer
        .send(harness.daemon_addr, OscMessage::new(REQ_ANNOUNCE))
        .await;

    // initial state, then the handoff location; no streamed entities
    let ack = observer.recv().await;
    assert_eq!(ack.path, GUI_ANNOUNCE_ACK);
    assert_eq!(ack.int(0), Some(1));
    assert_eq!(ack.int(1), Some(48_000));
    assert_eq!(ack.int(2), Some(1_024));

    let handoff = observer.recv().await;
    assert_eq!(handoff.path, GUI_FAST_TEMP_FILE);

    let doc = SnapshotDocument::read_from(&PathBuf::from(handoff.string(0).unwrap())).unwrap();
    assert_eq!(doc.ports.len(), 3);
    assert_eq!(doc.connections.len(), 1);
    assert_eq!(doc.ports[0].name, "synth:out_l");
    assert_eq!(doc.ports[0].flags, 0x2);
    assert_eq!(doc.connections[0].port_in_name, "system:playback_1");

    // the observer is live immediately: lifecycle and graph changes arrive
    harness
        .source_tx
        .send(SourceEvent::DspLoad(42))
        .await
        .unwrap();
    let msg = observer.recv().await;
    assert_eq!(msg.path, GUI_DSP_LOAD);
    assert_eq!(msg.int(0), Some(42));

    harness
        .source_tx
        .send(SourceEvent::PortAppeared {
            name: "synth:mono".into(),
            kind: PortKind::Audio,
            flags: 0x2,
        })
        .await
        .unwrap();
    let msg = observer.recv().await;
    assert_eq!(msg.path, GUI_PORT_ADDED);
    assert_eq!(msg.string(0), Some("synth:mono"));

    // last disannounce ends an exit-when-idle daemon
    observer
        .send(harness.daemon_addr, OscMessage::new(REQ_DISANNOUNCE))
        .await;
    let result = tokio::time::timeout(Duration::from_secs(5), harness.handle)
        .await
        .expect("daemon did not exit on idle")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn remote_observer_gets_paced_bulk_then_live_events() {
    let spool = tempfile::tempdir().unwrap();
    let harness = start_daemon(true, false, spool.path()).await;
    seed_graph(&harness).await;

    let mut observer = Observer::bind().await;
    observer
        .send(harness.daemon_addr, OscMessage::new(REQ_ANNOUNCE))
        .await;

    let ack = observer.recv().await;
    assert_eq!(ack.path, GUI_ANNOUNCE_ACK);

    // bulk: one port_added per port, one connection_added per connection,
    // bracketed by big_packets markers
    let mut paths = Vec::new();
    loop {
        let msg = observer.recv().await;
        let done = msg.path == GUI_BIG_PACKETS && msg.int(0) == Some(1);
        paths.push(msg.path);
        if done {
            break;
        }
    }
    assert_eq!(
        paths,
        vec![
            GUI_BIG_PACKETS,
            GUI_PORT_ADDED,
            GUI_PORT_ADDED,
            GUI_PORT_ADDED,
            GUI_CONNECTION_ADDED,
            GUI_BIG_PACKETS,
        ]
    );

    // live events flow once the bulk is done
    harness
        .source_tx
        .send(SourceEvent::PortAppeared {
            name: "sampler:out".into(),
            kind: PortKind::Audio,
            flags: 0x2,
        })
        .await
        .unwrap();
    let msg = observer.recv().await;
    assert_eq!(msg.path, GUI_PORT_ADDED);
    assert_eq!(msg.string(0), Some("sampler:out"));

    harness.shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), harness.handle).await;
}

#[tokio::test]
async fn refresh_tears_down_and_alias_round_trips() {
    let spool = tempfile::tempdir().unwrap();
    let harness = start_daemon(false, false, spool.path()).await;
    seed_graph(&harness).await;

    let mut observer = Observer::bind().await;
    observer
        .send(harness.daemon_addr, OscMessage::new(REQ_ANNOUNCE))
        .await;
    let _ack = observer.recv().await;
    let _handoff = observer.recv().await;

    // alias set by the observer lands in the next snapshot
    observer
        .send(
            harness.daemon_addr,
            OscMessage::with_args(
                REQ_PORT_SET_ALIAS,
                vec![
                    OscArg::from("synth:out_l"),
                    OscArg::Int(1),
                    OscArg::from("main left"),
                ],
            ),
        )
        .await;

    // a second announcing observer sees the alias in its handoff document
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut second = Observer::bind().await;
    second
        .send(harness.daemon_addr, OscMessage::new(REQ_ANNOUNCE))
        .await;
    let _ack = second.recv().await;
    let handoff = second.recv().await;
    let doc = SnapshotDocument::read_from(&PathBuf::from(handoff.string(0).unwrap())).unwrap();
    assert_eq!(doc.ports[0].alias_1, "main left");

    // refresh tears the mirror down; the removals reach live observers in
    // dependency order
    observer
        .send(harness.daemon_addr, OscMessage::new(REQ_REFRESH))
        .await;

    let first = observer.recv().await;
    assert_eq!(first.path, GUI_CONNECTION_REMOVED);
    for _ in 0..3 {
        assert_eq!(observer.recv().await.path, GUI_PORT_REMOVED);
    }

    harness.shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), harness.handle).await;
}

//! The synchronization hub
//!
//! Keeps every registered observer's remote copy consistent with the graph
//! store. Each observer owns a bounded outbound queue drained by its own
//! sender task, so one slow or paced delivery never blocks another observer
//! or the store's processing loop.
//!
//! Registration picks one of two delivery strategies:
//!
//! - **Local handoff**: an observer on the daemon's own host gets the whole
//!   graph as a shared JSON file and only the file's location on the wire.
//! - **Remote streaming**: everyone else gets a paced burst of one message
//!   per port and per connection, bracketed by `big_packets` markers. The
//!   observer joins the live broadcast list only after its burst finishes,
//!   so it never sees an incremental event for an entity it has not been
//!   sent yet.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use patchconf::SyncConfig;
use patchproto::catalog::GuiMessage;
use patchproto::{OscMessage, PortTypeCode, SnapshotConnection, SnapshotDocument, SnapshotPort};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::ObserverRequest;
use crate::graph::{GraphEvent, GraphStore, PortKind, PortProfile};
use crate::source::SourceControl;
use crate::sync::flow::FlowController;
use crate::transport::Transport;

/// Pluggable co-location check, overridable for tests and for deployments
/// where the heuristic's known false negatives matter.
pub type SameHostFn = fn(&SocketAddr, &SocketAddr) -> bool;

/// One queued delivery for an observer's sender task.
#[derive(Clone)]
enum Outbound {
    One(OscMessage),
    /// Paced as a unit; flips the observer live once it completes.
    Burst(Vec<OscMessage>),
}

struct Observer {
    tx: mpsc::Sender<Outbound>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    /// Handoff file to clean up if the observer never consumed it.
    spool_file: Option<PathBuf>,
}

/// Fan-out hub for all registered observers.
pub struct SyncHub {
    transport: Arc<dyn Transport>,
    flow: FlowController,
    queue_depth: usize,
    spool_dir: PathBuf,
    observers: HashMap<SocketAddr, Observer>,
    same_host: SameHostFn,
    running: bool,
    sample_rate: i32,
    buffer_size: i32,
    lost: bool,
    idle_tx: watch::Sender<bool>,
}

impl SyncHub {
    pub fn new(transport: Arc<dyn Transport>, sync: &SyncConfig, spool_dir: PathBuf) -> Self {
        let (idle_tx, _) = watch::channel(false);
        Self {
            transport,
            flow: FlowController::from_config(sync),
            queue_depth: sync.queue_depth,
            spool_dir,
            observers: HashMap::new(),
            same_host: crate::sync::locality::same_host_addrs,
            running: false,
            sample_rate: 0,
            buffer_size: 0,
            lost: false,
            idle_tx,
        }
    }

    /// Override co-location detection.
    pub fn with_same_host_check(mut self, check: SameHostFn) -> Self {
        self.same_host = check;
        self
    }

    /// Signals `true` whenever the observer list empties; the owner may
    /// treat that as permission to tear the hub down.
    pub fn idle_signal(&self) -> watch::Receiver<bool> {
        self.idle_tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    #[cfg(test)]
    pub(crate) fn observer_is_live(&self, addr: &SocketAddr) -> bool {
        self.observers
            .get(addr)
            .map(|o| o.live.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub async fn register_observer(&mut self, addr: SocketAddr, store: &GraphStore) {
        if self.observers.contains_key(&addr) {
            debug!(%addr, "observer already registered");
            return;
        }

        let ack = GuiMessage::AnnounceAck {
            running: self.running,
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
        }
        .into_osc();
        if let Err(e) = self.transport.send(addr, &ack).await {
            warn!(%addr, error = %e, "announce-ack send failed");
        }

        let local = (self.same_host)(&addr, &self.transport.local_addr());
        if local {
            match self.write_snapshot(store) {
                Ok(path) => {
                    let msg = GuiMessage::FastTempFile {
                        path: path.display().to_string(),
                    }
                    .into_osc();
                    if let Err(e) = self.transport.send(addr, &msg).await {
                        warn!(%addr, error = %e, "handoff notification send failed");
                    }
                    self.spawn_observer(addr, true, Some(path));
                    info!(%addr, "observer registered via local handoff");
                }
                Err(e) => {
                    warn!(%addr, error = %e, "snapshot write failed, streaming instead");
                    self.stream_registration(addr, store);
                }
            }
        } else {
            self.stream_registration(addr, store);
        }

        self.idle_tx.send_replace(false);
    }

    fn stream_registration(&mut self, addr: SocketAddr, store: &GraphStore) {
        let bulk = Self::bulk_messages(store);
        let count = bulk.len();
        let observer = self.spawn_observer(addr, false, None);
        if observer.tx.try_send(Outbound::Burst(bulk)).is_err() {
            warn!(%addr, "observer queue rejected registration burst");
        }
        info!(%addr, items = count, "observer registered, streaming graph");
    }

    fn spawn_observer(
        &mut self,
        addr: SocketAddr,
        live_now: bool,
        spool_file: Option<PathBuf>,
    ) -> &Observer {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let live = Arc::new(AtomicBool::new(live_now));
        let cancel = CancellationToken::new();

        tokio::spawn(run_sender(
            self.transport.clone(),
            addr,
            rx,
            live.clone(),
            cancel.clone(),
            self.flow,
        ));

        self.observers.insert(
            addr,
            Observer {
                tx,
                live,
                cancel,
                spool_file,
            },
        );
        &self.observers[&addr]
    }

    pub fn unregister_observer(&mut self, addr: &SocketAddr) {
        if let Some(observer) = self.observers.remove(addr) {
            observer.cancel.cancel();
            if let Some(path) = observer.spool_file {
                let _ = std::fs::remove_file(path);
            }
            info!(%addr, "observer unregistered");
        }

        if self.observers.is_empty() {
            self.idle_tx.send_replace(true);
            info!("no observers remain, hub is idle");
        }
    }

    /// Cancel every sender task and release spooled handoff files.
    pub fn shutdown(&mut self) {
        for (_, observer) in self.observers.drain() {
            observer.cancel.cancel();
            if let Some(path) = observer.spool_file {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Graph event fan-out
    // -----------------------------------------------------------------------

    /// Translate a drained event sequence into wire messages and fan them
    /// out. Everything between batch markers travels as one paced burst.
    pub fn publish_events(&mut self, events: Vec<GraphEvent>) {
        let mut batch: Option<Vec<OscMessage>> = None;

        for event in events {
            match event {
                GraphEvent::BatchBegin => batch = Some(Vec::new()),
                GraphEvent::BatchEnd => {
                    if let Some(msgs) = batch.take() {
                        self.broadcast_burst(msgs);
                    }
                }
                other => {
                    if let Some(msg) = translate(other) {
                        match batch.as_mut() {
                            Some(msgs) => msgs.push(msg),
                            None => self.broadcast_one(msg),
                        }
                    }
                }
            }
        }

        if let Some(msgs) = batch {
            warn!("unterminated event batch, flushing anyway");
            self.broadcast_burst(msgs);
        }
    }

    fn broadcast_one(&mut self, msg: OscMessage) {
        self.broadcast(Outbound::One(msg));
    }

    fn broadcast_burst(&mut self, msgs: Vec<OscMessage>) {
        self.broadcast(Outbound::Burst(msgs));
    }

    fn broadcast(&mut self, item: Outbound) {
        let mut dead = Vec::new();

        for (addr, observer) in &self.observers {
            if !observer.live.load(Ordering::Acquire) {
                continue;
            }
            match observer.tx.try_send(item.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%addr, "observer queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*addr),
            }
        }

        for addr in dead {
            debug!(%addr, "observer sender gone, removing");
            self.unregister_observer(&addr);
        }
    }

    // -----------------------------------------------------------------------
    // Observer requests
    // -----------------------------------------------------------------------

    pub async fn on_observer_request(
        &mut self,
        request: ObserverRequest,
        store: &mut GraphStore,
        source: &dyn SourceControl,
    ) {
        match request {
            ObserverRequest::Announce { from } => self.register_observer(from, store).await,
            ObserverRequest::Disannounce { from } => self.unregister_observer(&from),
            ObserverRequest::Connect { port_out, port_in } => {
                if let Err(e) = source.connect_ports(&port_out, &port_in).await {
                    warn!(port_out, port_in, error = %e, "connect request failed");
                }
            }
            ObserverRequest::Disconnect { port_out, port_in } => {
                if let Err(e) = source.disconnect_ports(&port_out, &port_in).await {
                    warn!(port_out, port_in, error = %e, "disconnect request failed");
                }
            }
            ObserverRequest::SetBufferSize { frames } => {
                if let Err(e) = source.set_buffer_size(frames).await {
                    warn!(frames, error = %e, "buffer size request failed");
                }
            }
            ObserverRequest::Refresh => {
                // Full resync: tear the mirror down (observers see the
                // removals), then the source re-reports everything as adds.
                store.clear();
                let events = store.drain_events();
                self.publish_events(events);
                if let Err(e) = source.refresh().await {
                    warn!(error = %e, "refresh request failed");
                }
            }
            ObserverRequest::SetPortAlias {
                port_name,
                slot,
                alias,
            } => {
                let Some((group_id, port_id)) = store
                    .port_by_wire_name(&port_name)
                    .map(|p| (p.group_id, p.port_id))
                else {
                    warn!(port_name, "alias request for unknown port");
                    return;
                };
                if let Err(e) = store.set_port_alias(group_id, port_id, slot, alias) {
                    warn!(port_name, error = %e, "alias request failed");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Source lifecycle
    // -----------------------------------------------------------------------

    /// The audio server came (back) up: relay the lifecycle messages, then
    /// re-stream the whole graph as one paced burst per observer.
    pub fn source_started(&mut self, sample_rate: i32, buffer_size: i32, store: &GraphStore) {
        self.running = true;
        self.lost = false;
        self.sample_rate = sample_rate;
        self.buffer_size = buffer_size;

        self.broadcast_one(GuiMessage::ServerStarted.into_osc());
        self.broadcast_one(GuiMessage::SampleRate(sample_rate).into_osc());
        self.broadcast_one(GuiMessage::BufferSize(buffer_size).into_osc());
        self.broadcast_burst(Self::bulk_messages(store));
    }

    pub fn source_stopped(&mut self) {
        self.running = false;
        self.broadcast_one(GuiMessage::ServerStopped.into_osc());
    }

    /// Contact with the source is gone. Announced once; the hub keeps its
    /// observers and stays in degraded broadcast-only mode until
    /// [`Self::source_started`] or shutdown.
    pub fn source_lost(&mut self) {
        if self.lost {
            return;
        }
        self.lost = true;
        self.running = false;
        self.broadcast_one(GuiMessage::ServerLose.into_osc());
    }

    pub fn sample_rate_changed(&mut self, sample_rate: i32) {
        self.sample_rate = sample_rate;
        self.broadcast_one(GuiMessage::SampleRate(sample_rate).into_osc());
    }

    pub fn buffer_size_changed(&mut self, buffer_size: i32) {
        self.buffer_size = buffer_size;
        self.broadcast_one(GuiMessage::BufferSize(buffer_size).into_osc());
    }

    pub fn dsp_load(&mut self, percent: i32) {
        self.broadcast_one(GuiMessage::DspLoad(percent).into_osc());
    }

    pub fn xrun(&mut self) {
        self.broadcast_one(GuiMessage::AddXrun.into_osc());
    }

    // -----------------------------------------------------------------------
    // Bulk state
    // -----------------------------------------------------------------------

    /// One message per port, then one per connection, in store order.
    pub fn bulk_messages(store: &GraphStore) -> Vec<OscMessage> {
        let mut msgs: Vec<OscMessage> = store
            .port_profiles()
            .into_iter()
            .map(port_added_msg)
            .collect();
        msgs.extend(
            store
                .connection_pairs()
                .into_iter()
                .map(|(port_out, port_in)| {
                    GuiMessage::ConnectionAdded { port_out, port_in }.into_osc()
                }),
        );
        msgs
    }

    fn write_snapshot(&self, store: &GraphStore) -> anyhow::Result<PathBuf> {
        let doc = SnapshotDocument {
            ports: store
                .port_profiles()
                .into_iter()
                .map(|p| SnapshotPort {
                    name: p.name,
                    alias_1: p.alias_1,
                    alias_2: p.alias_2,
                    type_code: kind_code(p.kind),
                    flags: p.flags as i32,
                    metadata: String::new(),
                })
                .collect(),
            connections: store
                .connection_pairs()
                .into_iter()
                .map(|(port_out_name, port_in_name)| SnapshotConnection {
                    port_out_name,
                    port_in_name,
                })
                .collect(),
        };

        let file = tempfile::Builder::new()
            .prefix("patchline-graph-")
            .suffix(".json")
            .tempfile_in(&self.spool_dir)?;
        doc.write_to(file.path())?;
        let (_file, path) = file.keep()?;
        Ok(path)
    }
}

/// Per-observer sender task: drains the queue, paces bursts, and flips the
/// observer live once a burst completes. Cancellation mid-burst stops
/// sending immediately and discards whatever is still queued.
async fn run_sender(
    transport: Arc<dyn Transport>,
    addr: SocketAddr,
    mut rx: mpsc::Receiver<Outbound>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    flow: FlowController,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = rx.recv() => item,
        };
        let Some(item) = item else { break };

        match item {
            Outbound::One(msg) => {
                if let Err(e) = transport.send(addr, &msg).await {
                    debug!(%addr, path = %msg.path, error = %e, "send failed");
                }
            }
            Outbound::Burst(msgs) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    () = flow.pace(transport.as_ref(), addr, &msgs) => {
                        live.store(true, Ordering::Release);
                    }
                }
            }
        }
    }
}

fn kind_code(kind: PortKind) -> i32 {
    let code = match kind {
        PortKind::Audio => PortTypeCode::Audio,
        PortKind::Midi => PortTypeCode::Midi,
        PortKind::Cv => PortTypeCode::Cv,
    };
    code as i32
}

fn port_added_msg(profile: PortProfile) -> OscMessage {
    GuiMessage::PortAdded {
        name: profile.name,
        alias_1: profile.alias_1,
        alias_2: profile.alias_2,
        type_code: kind_code(profile.kind),
        flags: profile.flags as i32,
        metadata: String::new(),
    }
    .into_osc()
}

/// Wire translation for one store event. Group and port-group changes have
/// no wire form; observers derive both from port names.
fn translate(event: GraphEvent) -> Option<OscMessage> {
    match event {
        GraphEvent::PortAdded { profile, .. } => Some(port_added_msg(profile)),
        GraphEvent::PortRenamed {
            old_name, new_name, ..
        } => Some(GuiMessage::PortRenamed { old_name, new_name }.into_osc()),
        GraphEvent::PortRemoved { name, .. } => Some(GuiMessage::PortRemoved { name }.into_osc()),
        GraphEvent::ConnectionAdded {
            port_out, port_in, ..
        } => Some(GuiMessage::ConnectionAdded { port_out, port_in }.into_osc()),
        GraphEvent::ConnectionRemoved {
            port_out, port_in, ..
        } => Some(GuiMessage::ConnectionRemoved { port_out, port_in }.into_osc()),
        GraphEvent::GroupAdded { .. }
        | GraphEvent::GroupRenamed { .. }
        | GraphEvent::GroupRemoved { .. }
        | GraphEvent::PortGroupAdded { .. }
        | GraphEvent::PortGroupRemoved { .. } => None,
        GraphEvent::BatchBegin | GraphEvent::BatchEnd => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{IconType, PortMode, SplitHint};
    use async_trait::async_trait;
    use patchproto::catalog::{
        GUI_ANNOUNCE_ACK, GUI_BIG_PACKETS, GUI_CONNECTION_ADDED, GUI_CONNECTION_REMOVED,
        GUI_FAST_TEMP_FILE, GUI_PORT_ADDED, GUI_PORT_REMOVED, GUI_SERVER_LOSE,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct ChannelTransport {
        tx: mpsc::UnboundedSender<(SocketAddr, OscMessage)>,
        local: SocketAddr,
    }

    impl ChannelTransport {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(SocketAddr, OscMessage)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    tx,
                    local: "127.0.0.1:16187".parse().unwrap(),
                }),
                rx,
            )
        }
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&self, to: SocketAddr, msg: &OscMessage) -> std::io::Result<()> {
            let _ = self.tx.send((to, msg.clone()));
            Ok(())
        }

        fn local_addr(&self) -> SocketAddr {
            self.local
        }
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<(SocketAddr, OscMessage)>) -> OscMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("transport channel closed")
            .1
    }

    fn test_store() -> GraphStore {
        let mut store = GraphStore::new();
        store
            .add_group(1, "synth", SplitHint::No, IconType::Application, "")
            .unwrap();
        store
            .add_port(1, 0, "out_l", PortMode::Output, PortKind::Audio, false, 0x2)
            .unwrap();
        store
            .add_port(1, 1, "out_r", PortMode::Output, PortKind::Audio, false, 0x2)
            .unwrap();
        store
            .add_group(2, "system", SplitHint::Undefined, IconType::Hardware, "")
            .unwrap();
        store
            .add_port(2, 0, "playback_1", PortMode::Input, PortKind::Audio, false, 0x5)
            .unwrap();
        store.connect(1, 1, 0, 2, 0).unwrap();
        store.drain_events();
        store
    }

    fn test_hub(transport: Arc<ChannelTransport>, spool: &std::path::Path) -> SyncHub {
        let sync = SyncConfig::default();
        SyncHub::new(transport, &sync, spool.to_path_buf())
    }

    async fn wait_live(hub: &SyncHub, addr: &SocketAddr) {
        for _ in 0..200 {
            if hub.observer_is_live(addr) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("observer never went live");
    }

    #[tokio::test]
    async fn local_observer_gets_handoff_not_stream() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path());
        let store = test_store();

        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;

        let ack = recv(&mut rx).await;
        assert_eq!(ack.path, GUI_ANNOUNCE_ACK);

        let handoff = recv(&mut rx).await;
        assert_eq!(handoff.path, GUI_FAST_TEMP_FILE);

        // exactly one handoff, zero port_added: nothing else is in flight
        assert!(rx.try_recv().is_err());

        // the document carries the whole graph
        let path = PathBuf::from(handoff.string(0).unwrap());
        let doc = SnapshotDocument::read_from(&path).unwrap();
        assert_eq!(doc.ports.len(), 3);
        assert_eq!(doc.connections.len(), 1);
        assert_eq!(doc.ports[0].name, "synth:out_l");
        assert_eq!(doc.connections[0].port_out_name, "synth:out_l");

        // handoff file is released with the observer
        hub.unregister_observer(&addr);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remote_observer_gets_bracketed_stream() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path()).with_same_host_check(|_, _| false);
        let store = test_store();

        let addr: SocketAddr = "198.51.100.7:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;

        let ack = recv(&mut rx).await;
        assert_eq!(ack.path, GUI_ANNOUNCE_ACK);

        let paths: Vec<String> = {
            let mut got = Vec::new();
            loop {
                let msg = recv(&mut rx).await;
                let done = msg.path == GUI_BIG_PACKETS && msg.int(0) == Some(1);
                got.push(msg.path);
                if done {
                    break;
                }
            }
            got
        };
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
    }

    #[tokio::test]
    async fn pause_brackets_every_batch_in_long_streams() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let sync = SyncConfig {
            batch_size: 2,
            pause_ms: 0,
            queue_depth: 64,
        };
        let mut hub = SyncHub::new(transport, &sync, spool.path().to_path_buf())
            .with_same_host_check(|_, _| false);
        let store = test_store();

        let addr: SocketAddr = "198.51.100.7:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        wait_live(&hub, &addr).await;
        let _ack = recv(&mut rx).await;

        // 4 items at batch size 2: begin, 2, end/begin, 2, end/begin, end
        let mut markers = 0;
        let mut items = 0;
        while let Ok((_, msg)) = rx.try_recv() {
            if msg.path == GUI_BIG_PACKETS {
                markers += 1;
            } else {
                items += 1;
            }
        }
        assert_eq!(items, 4);
        assert_eq!(markers, 6);
    }

    #[tokio::test]
    async fn live_events_reach_streamed_observer_after_bulk() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path()).with_same_host_check(|_, _| false);
        let mut store = test_store();

        let addr: SocketAddr = "198.51.100.7:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        wait_live(&hub, &addr).await;
        // drain registration traffic
        while rx.try_recv().is_ok() {}

        store
            .add_port(1, 2, "mono", PortMode::Output, PortKind::Audio, false, 0x2)
            .unwrap();
        hub.publish_events(store.drain_events());

        let msg = recv(&mut rx).await;
        assert_eq!(msg.path, GUI_PORT_ADDED);
        assert_eq!(msg.string(0), Some("synth:mono"));
    }

    #[tokio::test]
    async fn cascade_removal_order_on_the_wire() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path());
        let mut store = test_store();
        // a third synth port and a second connection touching the group
        store
            .add_port(1, 2, "mono", PortMode::Output, PortKind::Audio, false, 0x2)
            .unwrap();
        store.connect(2, 1, 2, 2, 0).unwrap();
        store.drain_events();

        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        let _ack = recv(&mut rx).await;
        let _handoff = recv(&mut rx).await;

        store.remove_group(1).unwrap();
        hub.publish_events(store.drain_events());

        let mut paths = Vec::new();
        for _ in 0..5 {
            paths.push(recv(&mut rx).await.path);
        }
        assert_eq!(
            paths,
            vec![
                GUI_CONNECTION_REMOVED,
                GUI_CONNECTION_REMOVED,
                GUI_PORT_REMOVED,
                GUI_PORT_REMOVED,
                GUI_PORT_REMOVED,
            ]
        );
    }

    #[tokio::test]
    async fn split_replay_travels_as_one_paced_burst() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path());
        let mut store = test_store();

        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        let _ack = recv(&mut rx).await;
        let _handoff = recv(&mut rx).await;

        store.split_group(1).unwrap();
        hub.publish_events(store.drain_events());

        let first = recv(&mut rx).await;
        assert_eq!(first.path, GUI_BIG_PACKETS);
        assert_eq!(first.int(0), Some(0));

        let mut last = recv(&mut rx).await;
        while !(last.path == GUI_BIG_PACKETS && last.int(0) == Some(1)) {
            last = recv(&mut rx).await;
        }
    }

    #[tokio::test]
    async fn idle_signal_fires_when_last_observer_leaves() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path());
        let store = test_store();
        let mut idle = hub.idle_signal();

        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        let _ack = recv(&mut rx).await;
        let _handoff = recv(&mut rx).await;
        assert!(!*idle.borrow_and_update());

        hub.unregister_observer(&addr);
        assert!(*idle.borrow_and_update());
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn server_lose_is_sent_once() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        let mut hub = test_hub(transport, spool.path());
        let store = test_store();

        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        let _ack = recv(&mut rx).await;
        let _handoff = recv(&mut rx).await;

        hub.source_lost();
        hub.source_lost();

        let msg = recv(&mut rx).await;
        assert_eq!(msg.path, GUI_SERVER_LOSE);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mid_stream_disconnect_cancels_the_bulk() {
        let (transport, mut rx) = ChannelTransport::new();
        let spool = tempfile::tempdir().unwrap();
        // a long pause so the burst is still in flight when we cancel
        let sync = SyncConfig {
            batch_size: 1,
            pause_ms: 5_000,
            queue_depth: 64,
        };
        let mut hub = SyncHub::new(transport, &sync, spool.path().to_path_buf())
            .with_same_host_check(|_, _| false);
        let store = test_store();

        let addr: SocketAddr = "198.51.100.7:9001".parse().unwrap();
        hub.register_observer(addr, &store).await;
        let _ack = recv(&mut rx).await;
        let _begin = recv(&mut rx).await;
        let _first_item = recv(&mut rx).await;

        hub.unregister_observer(&addr);

        // the paced task stops; at most the already-queued end marker leaks
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut leaked_items = 0;
        while let Ok((_, msg)) = rx.try_recv() {
            if msg.path != GUI_BIG_PACKETS {
                leaked_items += 1;
            }
        }
        assert!(leaked_items <= 1, "bulk kept streaming after cancel");
    }
}

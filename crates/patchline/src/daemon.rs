//! The daemon processing loop
//!
//! One task owns the graph store and the hub, and serializes every mutation:
//! source events and observer requests are applied in arrival order, and the
//! change events each mutation produced are fanned out before the next one
//! is touched. That single choke point is what makes event ordering total
//! and global across observers.

use std::net::SocketAddr;
use std::sync::Arc;

use patchproto::OscMessage;
use patchproto::PortFlags;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::graph::{GraphStore, IconType, PortKind, PortMode, SplitHint};
use crate::source::{SourceControl, SourceEvent};
use crate::sync::SyncHub;

pub struct Daemon {
    store: GraphStore,
    hub: SyncHub,
    source: Arc<dyn SourceControl>,
    dispatcher: Dispatcher,
}

impl Daemon {
    pub fn new(hub: SyncHub, source: Arc<dyn SourceControl>) -> Self {
        Self {
            store: GraphStore::new(),
            hub,
            source,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Run until `shutdown` fires, both inputs close, or (with
    /// `exit_when_idle`) the last observer disannounces.
    pub async fn run(
        mut self,
        mut source_events: mpsc::Receiver<SourceEvent>,
        mut requests: mpsc::Receiver<(SocketAddr, OscMessage)>,
        shutdown: CancellationToken,
        exit_when_idle: bool,
    ) -> anyhow::Result<()> {
        let mut idle = self.hub.idle_signal();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = idle.changed(), if exit_when_idle => {
                    if *idle.borrow() {
                        info!("last observer left, exiting");
                        break;
                    }
                }
                event = source_events.recv() => {
                    let Some(event) = event else {
                        info!("source event stream closed");
                        break;
                    };
                    self.apply_source_event(event);
                    let events = self.store.drain_events();
                    self.hub.publish_events(events);
                }
                request = requests.recv() => {
                    let Some((from, msg)) = request else {
                        info!("transport receiver closed");
                        break;
                    };
                    if let Some(request) = self.dispatcher.dispatch(&msg, from) {
                        self.hub
                            .on_observer_request(request, &mut self.store, self.source.as_ref())
                            .await;
                        let events = self.store.drain_events();
                        self.hub.publish_events(events);
                    }
                }
            }
        }

        self.hub.shutdown();
        Ok(())
    }

    /// Mirror one source report into the store. Invalid reports are logged
    /// and dropped; the store stays in its last valid state.
    fn apply_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Started {
                sample_rate,
                buffer_size,
            } => self.hub.source_started(sample_rate, buffer_size, &self.store),
            SourceEvent::Stopped => self.hub.source_stopped(),
            SourceEvent::Lost => self.hub.source_lost(),
            SourceEvent::SampleRateChanged(v) => self.hub.sample_rate_changed(v),
            SourceEvent::BufferSizeChanged(v) => self.hub.buffer_size_changed(v),
            SourceEvent::DspLoad(v) => self.hub.dsp_load(v),
            SourceEvent::Xrun => self.hub.xrun(),
            SourceEvent::PortAppeared { name, kind, flags } => {
                self.port_appeared(&name, kind, flags)
            }
            SourceEvent::PortDisappeared { name } => self.port_disappeared(&name),
            SourceEvent::PortRenamed { old_name, new_name } => {
                self.port_renamed(&old_name, &new_name)
            }
            SourceEvent::ConnectionAppeared { port_out, port_in } => {
                self.connection_appeared(&port_out, &port_in)
            }
            SourceEvent::ConnectionDisappeared { port_out, port_in } => {
                self.connection_disappeared(&port_out, &port_in)
            }
        }
    }

    fn port_appeared(&mut self, name: &str, kind: PortKind, flags: u32) {
        if self.store.port_by_wire_name(name).is_some() {
            debug!(name, "port already known");
            return;
        }
        let Some((client, short)) = name.split_once(':') else {
            warn!(name, "ignoring port without a client prefix");
            return;
        };
        let mode = if flags & PortFlags::IS_INPUT != 0 {
            PortMode::Input
        } else if flags & PortFlags::IS_OUTPUT != 0 {
            PortMode::Output
        } else {
            warn!(name, flags, "ignoring port with no direction flag");
            return;
        };

        let group_id = match self.store.group_by_name(client) {
            Some(group) => group.group_id,
            None => {
                let group_id = self.store.next_group_id();
                let icon = if flags & PortFlags::IS_PHYSICAL != 0 {
                    IconType::Hardware
                } else {
                    IconType::Application
                };
                if let Err(e) =
                    self.store
                        .add_group(group_id, client, SplitHint::Undefined, icon, "")
                {
                    warn!(client, error = %e, "group creation failed");
                    return;
                }
                group_id
            }
        };

        let port_id = self.store.next_port_id(group_id);
        if let Err(e) = self
            .store
            .add_port(group_id, port_id, short, mode, kind, false, flags)
        {
            warn!(name, error = %e, "port add failed");
        }
    }

    fn port_disappeared(&mut self, name: &str) {
        let Some((group_id, port_id, portgrp_id)) = self
            .store
            .port_by_wire_name(name)
            .map(|p| (p.group_id, p.port_id, p.portgroup_id))
        else {
            warn!(name, "removal report for unknown port");
            return;
        };

        // Honor the store's removal preconditions: connections first, then
        // any port-group membership, then the port.
        let connection_ids: Vec<u32> = self
            .store
            .connections()
            .filter(|c| {
                (c.group_out_id == group_id && c.port_out_id == port_id)
                    || (c.group_in_id == group_id && c.port_in_id == port_id)
            })
            .map(|c| c.connection_id)
            .collect();
        for id in connection_ids {
            if let Err(e) = self.store.disconnect(id) {
                warn!(connection_id = id, error = %e, "implicit disconnect failed");
            }
        }
        if portgrp_id != 0 {
            if let Err(e) = self.store.remove_port_group(group_id, portgrp_id) {
                warn!(group_id, portgrp_id, error = %e, "implicit port-group removal failed");
            }
        }
        if let Err(e) = self.store.remove_port(group_id, port_id) {
            warn!(name, error = %e, "port removal failed");
            return;
        }

        // a client with no ports left has nothing to show
        if self.store.ports().all(|p| p.group_id != group_id) {
            if let Err(e) = self.store.remove_group(group_id) {
                warn!(group_id, error = %e, "empty group removal failed");
            }
        }
    }

    fn port_renamed(&mut self, old_name: &str, new_name: &str) {
        let Some((group_id, port_id)) = self
            .store
            .port_by_wire_name(old_name)
            .map(|p| (p.group_id, p.port_id))
        else {
            warn!(old_name, "rename report for unknown port");
            return;
        };
        let Some((new_client, new_short)) = new_name.split_once(':') else {
            warn!(new_name, "ignoring rename without a client prefix");
            return;
        };

        let client_changed = self
            .store
            .group(group_id)
            .map(|g| g.name != new_client)
            .unwrap_or(false);
        if client_changed {
            if let Err(e) = self.store.rename_group(group_id, new_client) {
                warn!(group_id, error = %e, "group rename failed");
            }
        }
        if let Err(e) = self.store.rename_port(group_id, port_id, new_short) {
            warn!(old_name, new_name, error = %e, "port rename failed");
        }
    }

    fn connection_appeared(&mut self, port_out: &str, port_in: &str) {
        if self.store.connection_by_endpoints(port_out, port_in).is_some() {
            debug!(port_out, port_in, "connection already known");
            return;
        }
        let Some(out) = self
            .store
            .port_by_wire_name(port_out)
            .map(|p| (p.group_id, p.port_id))
        else {
            warn!(port_out, "connection report with unknown output port");
            return;
        };
        let Some(inp) = self
            .store
            .port_by_wire_name(port_in)
            .map(|p| (p.group_id, p.port_id))
        else {
            warn!(port_in, "connection report with unknown input port");
            return;
        };

        let id = self.store.next_connection_id();
        if let Err(e) = self.store.connect(id, out.0, out.1, inp.0, inp.1) {
            warn!(port_out, port_in, error = %e, "connection add failed");
        }
    }

    fn connection_disappeared(&mut self, port_out: &str, port_in: &str) {
        let Some(id) = self
            .store
            .connection_by_endpoints(port_out, port_in)
            .map(|c| c.connection_id)
        else {
            warn!(port_out, port_in, "removal report for unknown connection");
            return;
        };
        if let Err(e) = self.store.disconnect(id) {
            warn!(port_out, port_in, error = %e, "connection removal failed");
        }
    }
}

//! The canonical graph store
//!
//! Entity tables are plain vectors in insertion order: the port table's
//! order is load-bearing (port-group membership must form a consecutive run
//! of the same-mode, same-kind ports as they were added), and a patchbay's
//! entity counts stay small enough that linear scans beat any index.

use std::collections::HashMap;

use tracing::warn;

use super::{
    AliasSlot, Connection, GraphError, GraphEvent, Group, IconType, NodeRef, Port, PortGroup,
    PortKind, PortMode, PortProfile, SplitHint, MAX_PLUGIN_ID, NO_PLUGIN,
};

/// Transient copy of one group's entire subtree, taken before a split/join
/// teardown and replayed after the group is re-created.
#[derive(Debug, Clone)]
struct GroupSnapshot {
    group: Group,
    ports: Vec<Port>,
    portgroups: Vec<PortGroup>,
    connections: Vec<Connection>,
}

/// The canonical mutable graph model. See the module docs in [`crate::graph`].
#[derive(Debug, Default)]
pub struct GraphStore {
    groups: Vec<Group>,
    ports: Vec<Port>,
    portgroups: Vec<PortGroup>,
    connections: Vec<Connection>,
    /// Reverse index for O(1) plugin lookups.
    group_plugin_map: HashMap<i32, u32>,
    /// Highest connection id ever issued (0 = none yet).
    last_connection_id: u32,
    next_node: u64,
    events: Vec<GraphEvent>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Change events
    // -----------------------------------------------------------------------

    /// Take all change events recorded since the last drain, in mutation
    /// order.
    pub fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(&mut self, event: GraphEvent) {
        self.events.push(event);
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn portgroups(&self) -> impl Iterator<Item = &PortGroup> {
        self.portgroups.iter()
    }

    pub fn group(&self, group_id: u32) -> Option<&Group> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    fn group_mut(&mut self, group_id: u32) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.group_id == group_id)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn port(&self, group_id: u32, port_id: u32) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.group_id == group_id && p.port_id == port_id)
    }

    fn port_mut(&mut self, group_id: u32, port_id: u32) -> Option<&mut Port> {
        self.ports
            .iter_mut()
            .find(|p| p.group_id == group_id && p.port_id == port_id)
    }

    pub fn portgroup(&self, group_id: u32, portgrp_id: u32) -> Option<&PortGroup> {
        self.portgroups
            .iter()
            .find(|pg| pg.group_id == group_id && pg.portgrp_id == portgrp_id)
    }

    pub fn connection(&self, connection_id: u32) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.connection_id == connection_id)
    }

    /// The group a plugin id maps to, via the reverse index.
    pub fn group_by_plugin(&self, plugin_id: i32) -> Option<&Group> {
        let group_id = *self.group_plugin_map.get(&plugin_id)?;
        self.group(group_id)
    }

    /// Resolve a full wire name (`"group:port"`) to its port.
    pub fn port_by_wire_name(&self, wire_name: &str) -> Option<&Port> {
        let (client, short) = wire_name.split_once(':')?;
        let group = self.group_by_name(client)?;
        self.ports
            .iter()
            .find(|p| p.group_id == group.group_id && p.name == short)
    }

    /// Resolve a pair of full wire names to the connection between them.
    pub fn connection_by_endpoints(&self, out_name: &str, in_name: &str) -> Option<&Connection> {
        let out = self.port_by_wire_name(out_name)?;
        let inp = self.port_by_wire_name(in_name)?;
        self.connections.iter().find(|c| {
            c.group_out_id == out.group_id
                && c.port_out_id == out.port_id
                && c.group_in_id == inp.group_id
                && c.port_in_id == inp.port_id
        })
    }

    /// Full wire name of a port that is known to exist.
    pub fn wire_name(&self, group_id: u32, port_id: u32) -> Option<String> {
        let group = self.group(group_id)?;
        let port = self.port(group_id, port_id)?;
        Some(format!("{}:{}", group.name, port.name))
    }

    /// Wire-facing summaries of every port, in table order.
    pub fn port_profiles(&self) -> Vec<PortProfile> {
        self.ports
            .iter()
            .map(|p| self.profile_of(p))
            .collect()
    }

    /// Endpoint name pairs of every connection, in table order.
    pub fn connection_pairs(&self) -> Vec<(String, String)> {
        self.connections
            .iter()
            .filter_map(|c| {
                Some((
                    self.wire_name(c.group_out_id, c.port_out_id)?,
                    self.wire_name(c.group_in_id, c.port_in_id)?,
                ))
            })
            .collect()
    }

    fn profile_of(&self, port: &Port) -> PortProfile {
        let group_name = self
            .group(port.group_id)
            .map(|g| g.name.as_str())
            .unwrap_or_default();
        PortProfile {
            name: format!("{}:{}", group_name, port.name),
            alias_1: port.alias_1.clone(),
            alias_2: port.alias_2.clone(),
            kind: port.kind,
            flags: port.flags,
        }
    }

    // -----------------------------------------------------------------------
    // Id allocation
    // -----------------------------------------------------------------------

    pub fn next_group_id(&self) -> u32 {
        self.groups.iter().map(|g| g.group_id).max().unwrap_or(0) + 1
    }

    pub fn next_port_id(&self, group_id: u32) -> u32 {
        self.ports
            .iter()
            .filter(|p| p.group_id == group_id)
            .map(|p| p.port_id)
            .max()
            .map(|max| max + 1)
            .unwrap_or(0)
    }

    pub fn next_connection_id(&self) -> u32 {
        self.last_connection_id + 1
    }

    fn alloc_node(&mut self) -> NodeRef {
        self.next_node += 1;
        NodeRef(self.next_node)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn add_group(
        &mut self,
        group_id: u32,
        name: impl Into<String>,
        split_hint: SplitHint,
        icon_type: IconType,
        icon_name: impl Into<String>,
    ) -> Result<(), GraphError> {
        if self.group(group_id).is_some() {
            return Err(GraphError::GroupExists(group_id));
        }

        let split = match split_hint {
            SplitHint::Yes => true,
            SplitHint::No => false,
            // hardware boxes read better split into capture and playback
            SplitHint::Undefined => icon_type == IconType::Hardware,
        };

        let nodes = if split {
            [Some(self.alloc_node()), Some(self.alloc_node())]
        } else {
            [Some(self.alloc_node()), None]
        };

        self.groups.push(Group {
            group_id,
            name: name.into(),
            icon_type,
            icon_name: icon_name.into(),
            split,
            plugin_id: NO_PLUGIN,
            handle_client_gui: false,
            gui_visible: false,
            nodes,
        });
        self.record(GraphEvent::GroupAdded { group_id });
        Ok(())
    }

    /// Remove a group and everything it owns. Cascades in teardown order:
    /// connections touching the group, its port-groups, its ports, then the
    /// group itself, each removal recording its ordinary event.
    pub fn remove_group(&mut self, group_id: u32) -> Result<(), GraphError> {
        let group = self.group(group_id).ok_or(GraphError::GroupNotFound(group_id))?;
        let plugin_id = group.plugin_id;

        let connection_ids: Vec<u32> = self
            .connections
            .iter()
            .filter(|c| c.group_out_id == group_id || c.group_in_id == group_id)
            .map(|c| c.connection_id)
            .collect();
        for id in connection_ids {
            self.disconnect(id)?;
        }

        let portgrp_ids: Vec<u32> = self
            .portgroups
            .iter()
            .filter(|pg| pg.group_id == group_id)
            .map(|pg| pg.portgrp_id)
            .collect();
        for id in portgrp_ids {
            self.remove_port_group(group_id, id)?;
        }

        let port_ids: Vec<u32> = self
            .ports
            .iter()
            .filter(|p| p.group_id == group_id)
            .map(|p| p.port_id)
            .collect();
        for id in port_ids {
            self.remove_port(group_id, id)?;
        }

        self.groups.retain(|g| g.group_id != group_id);
        if plugin_id != NO_PLUGIN {
            self.group_plugin_map.remove(&plugin_id);
        }
        self.record(GraphEvent::GroupRemoved { group_id });
        Ok(())
    }

    /// Rename a group. Every owned port's full wire name changes with it, so
    /// a rename event is recorded for each port as well.
    pub fn rename_group(
        &mut self,
        group_id: u32,
        new_name: impl Into<String>,
    ) -> Result<(), GraphError> {
        let new_name = new_name.into();
        let old_name = {
            let group = self
                .group_mut(group_id)
                .ok_or(GraphError::GroupNotFound(group_id))?;
            std::mem::replace(&mut group.name, new_name.clone())
        };
        self.record(GraphEvent::GroupRenamed { group_id });

        let renames: Vec<GraphEvent> = self
            .ports
            .iter()
            .filter(|p| p.group_id == group_id)
            .map(|p| GraphEvent::PortRenamed {
                group_id,
                port_id: p.port_id,
                old_name: format!("{}:{}", old_name, p.name),
                new_name: format!("{}:{}", new_name, p.name),
            })
            .collect();
        for event in renames {
            self.record(event);
        }
        Ok(())
    }

    pub fn set_group_icon(
        &mut self,
        group_id: u32,
        icon_type: IconType,
        icon_name: impl Into<String>,
    ) -> Result<(), GraphError> {
        let group = self
            .group_mut(group_id)
            .ok_or(GraphError::GroupNotFound(group_id))?;
        group.icon_type = icon_type;
        group.icon_name = icon_name.into();
        Ok(())
    }

    /// Mark the group's client as one that exposes an optional GUI, and
    /// record whether that GUI is currently visible.
    pub fn set_optional_gui_state(
        &mut self,
        group_id: u32,
        visible: bool,
    ) -> Result<(), GraphError> {
        let group = self
            .group_mut(group_id)
            .ok_or(GraphError::GroupNotFound(group_id))?;
        group.handle_client_gui = true;
        group.gui_visible = visible;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plugin association
    // -----------------------------------------------------------------------

    pub fn set_group_as_plugin(&mut self, group_id: u32, plugin_id: i32) -> Result<(), GraphError> {
        let group = self
            .group_mut(group_id)
            .ok_or(GraphError::GroupNotFound(group_id))?;
        group.plugin_id = plugin_id;
        self.group_plugin_map.insert(plugin_id, group_id);
        Ok(())
    }

    /// Drop one group's plugin association without renumbering anything
    /// (the group is leaving, not the plugin).
    pub fn clear_plugin(&mut self, group_id: u32) -> Result<(), GraphError> {
        let group = self
            .group_mut(group_id)
            .ok_or(GraphError::GroupNotFound(group_id))?;
        let plugin_id = std::mem::replace(&mut group.plugin_id, NO_PLUGIN);
        if plugin_id != NO_PLUGIN {
            self.group_plugin_map.remove(&plugin_id);
        }
        Ok(())
    }

    /// Mirror the plugin host's removal contract: the removed id's group
    /// loses its association, and every group holding a higher id (up to
    /// [`MAX_PLUGIN_ID`]) shifts down by one so the host's ids stay dense.
    pub fn handle_plugin_removed(&mut self, plugin_id: i32) {
        if let Some(group_id) = self.group_plugin_map.remove(&plugin_id) {
            if let Some(group) = self.group_mut(group_id) {
                group.plugin_id = NO_PLUGIN;
            }
        }

        for group in &mut self.groups {
            if group.plugin_id < plugin_id || group.plugin_id > MAX_PLUGIN_ID {
                continue;
            }
            group.plugin_id -= 1;
        }

        self.group_plugin_map = self
            .groups
            .iter()
            .filter(|g| g.plugin_id != NO_PLUGIN)
            .map(|g| (g.plugin_id, g.group_id))
            .collect();
    }

    /// Drop every plugin association at once (host shutdown).
    pub fn handle_all_plugins_removed(&mut self) {
        self.group_plugin_map.clear();
        for group in &mut self.groups {
            if group.plugin_id != NO_PLUGIN && group.plugin_id <= MAX_PLUGIN_ID {
                group.plugin_id = NO_PLUGIN;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ports
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn add_port(
        &mut self,
        group_id: u32,
        port_id: u32,
        name: impl Into<String>,
        mode: PortMode,
        kind: PortKind,
        is_alternate: bool,
        flags: u32,
    ) -> Result<(), GraphError> {
        self.insert_port(Port {
            group_id,
            port_id,
            name: name.into(),
            mode,
            kind,
            is_alternate,
            portgroup_id: 0,
            alias_1: String::new(),
            alias_2: String::new(),
            flags,
        })
    }

    /// Validate and insert a fully-formed port record. Split/join replay
    /// comes through here so aliases survive the rebuild.
    fn insert_port(&mut self, port: Port) -> Result<(), GraphError> {
        if self.group(port.group_id).is_none() {
            return Err(GraphError::GroupNotFound(port.group_id));
        }
        if self.port(port.group_id, port.port_id).is_some() {
            return Err(GraphError::PortExists(port.group_id, port.port_id));
        }

        let (group_id, port_id) = (port.group_id, port.port_id);
        let profile = self.profile_of(&port);
        self.ports.push(port);
        self.record(GraphEvent::PortAdded {
            group_id,
            port_id,
            profile,
        });
        Ok(())
    }

    /// Remove one port. The caller must first dissolve its port-group
    /// membership and disconnect it; those are deliberate preconditions, not
    /// cascades.
    pub fn remove_port(&mut self, group_id: u32, port_id: u32) -> Result<(), GraphError> {
        let port = self
            .port(group_id, port_id)
            .ok_or(GraphError::PortNotFound(group_id, port_id))?;
        if port.portgroup_id != 0 {
            return Err(GraphError::PortInPortGroup(
                group_id,
                port_id,
                port.portgroup_id,
            ));
        }
        if self.connections.iter().any(|c| {
            (c.group_out_id == group_id && c.port_out_id == port_id)
                || (c.group_in_id == group_id && c.port_in_id == port_id)
        }) {
            return Err(GraphError::PortHasConnections(group_id, port_id));
        }

        let name = self.wire_name(group_id, port_id).unwrap_or_default();
        self.ports
            .retain(|p| !(p.group_id == group_id && p.port_id == port_id));
        self.record(GraphEvent::PortRemoved {
            group_id,
            port_id,
            name,
        });
        Ok(())
    }

    pub fn rename_port(
        &mut self,
        group_id: u32,
        port_id: u32,
        new_name: impl Into<String>,
    ) -> Result<(), GraphError> {
        let new_name = new_name.into();
        let old_wire = self
            .wire_name(group_id, port_id)
            .ok_or(GraphError::PortNotFound(group_id, port_id))?;

        let port = self
            .port_mut(group_id, port_id)
            .ok_or(GraphError::PortNotFound(group_id, port_id))?;
        if port.name == new_name {
            return Ok(());
        }
        port.name = new_name;

        let new_wire = self.wire_name(group_id, port_id).unwrap_or_default();
        self.record(GraphEvent::PortRenamed {
            group_id,
            port_id,
            old_name: old_wire,
            new_name: new_wire,
        });
        Ok(())
    }

    pub fn set_port_alias(
        &mut self,
        group_id: u32,
        port_id: u32,
        slot: AliasSlot,
        alias: impl Into<String>,
    ) -> Result<(), GraphError> {
        let port = self
            .port_mut(group_id, port_id)
            .ok_or(GraphError::PortNotFound(group_id, port_id))?;
        match slot {
            AliasSlot::First => port.alias_1 = alias.into(),
            AliasSlot::Second => port.alias_2 = alias.into(),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Port-groups
    // -----------------------------------------------------------------------

    /// Create a port-group over `port_ids`. The members must be a
    /// consecutive run of the group's same-mode, same-kind ports, in table
    /// order, and free of any existing port-group.
    pub fn add_port_group(
        &mut self,
        group_id: u32,
        portgrp_id: u32,
        mode: PortMode,
        kind: PortKind,
        port_ids: Vec<u32>,
    ) -> Result<(), GraphError> {
        if portgrp_id == 0 {
            return Err(GraphError::ReservedPortGroupId);
        }
        if port_ids.is_empty() {
            return Err(GraphError::EmptyPortGroup);
        }
        if self.group(group_id).is_none() {
            return Err(GraphError::GroupNotFound(group_id));
        }
        if self.portgroup(group_id, portgrp_id).is_some() {
            return Err(GraphError::PortGroupExists(group_id, portgrp_id));
        }

        // Every listed port must exist and carry the port-group's mode/kind.
        for &port_id in &port_ids {
            let port = self
                .port(group_id, port_id)
                .ok_or(GraphError::PortNotFound(group_id, port_id))?;
            if port.mode != mode || port.kind != kind {
                return Err(GraphError::MemberMismatch(group_id, port_id));
            }
        }

        // Walk the group's same-mode/same-kind ports in table order and
        // match the member list as one contiguous run.
        let mut matched = 0;
        for port in self
            .ports
            .iter()
            .filter(|p| p.group_id == group_id && p.mode == mode && p.kind == kind)
        {
            if port.port_id == port_ids[matched] {
                if port.portgroup_id != 0 {
                    return Err(GraphError::AlreadyGrouped(
                        group_id,
                        port.port_id,
                        port.portgroup_id,
                    ));
                }
                matched += 1;
                if matched == port_ids.len() {
                    break;
                }
            } else if matched > 0 {
                return Err(GraphError::NotConsecutive(port_ids));
            }
        }
        if matched != port_ids.len() {
            return Err(GraphError::NotConsecutive(port_ids));
        }

        for port in self
            .ports
            .iter_mut()
            .filter(|p| p.group_id == group_id && port_ids.contains(&p.port_id))
        {
            port.portgroup_id = portgrp_id;
        }
        self.portgroups.push(PortGroup {
            group_id,
            portgrp_id,
            mode,
            kind,
            port_ids,
        });
        self.record(GraphEvent::PortGroupAdded {
            group_id,
            portgrp_id,
        });
        Ok(())
    }

    pub fn remove_port_group(&mut self, group_id: u32, portgrp_id: u32) -> Result<(), GraphError> {
        if self.portgroup(group_id, portgrp_id).is_none() {
            return Err(GraphError::PortGroupNotFound(group_id, portgrp_id));
        }

        for port in self
            .ports
            .iter_mut()
            .filter(|p| p.group_id == group_id && p.portgroup_id == portgrp_id)
        {
            port.portgroup_id = 0;
        }
        self.portgroups
            .retain(|pg| !(pg.group_id == group_id && pg.portgrp_id == portgrp_id));
        self.record(GraphEvent::PortGroupRemoved {
            group_id,
            portgrp_id,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    pub fn connect(
        &mut self,
        connection_id: u32,
        group_out_id: u32,
        port_out_id: u32,
        group_in_id: u32,
        port_in_id: u32,
    ) -> Result<(), GraphError> {
        if self.connection(connection_id).is_some() {
            return Err(GraphError::ConnectionExists(connection_id));
        }

        let out = self
            .port(group_out_id, port_out_id)
            .ok_or(GraphError::EndpointNotFound(group_out_id, port_out_id))?;
        if out.mode != PortMode::Output {
            return Err(GraphError::PortModeMismatch(group_out_id, port_out_id));
        }
        let inp = self
            .port(group_in_id, port_in_id)
            .ok_or(GraphError::EndpointNotFound(group_in_id, port_in_id))?;
        if inp.mode != PortMode::Input {
            return Err(GraphError::PortModeMismatch(group_in_id, port_in_id));
        }

        self.connections.push(Connection {
            connection_id,
            group_out_id,
            port_out_id,
            group_in_id,
            port_in_id,
        });
        self.last_connection_id = self.last_connection_id.max(connection_id);

        let port_out = self.wire_name(group_out_id, port_out_id).unwrap_or_default();
        let port_in = self.wire_name(group_in_id, port_in_id).unwrap_or_default();
        self.record(GraphEvent::ConnectionAdded {
            connection_id,
            port_out,
            port_in,
        });
        Ok(())
    }

    pub fn disconnect(&mut self, connection_id: u32) -> Result<(), GraphError> {
        let conn = *self
            .connection(connection_id)
            .ok_or(GraphError::ConnectionNotFound(connection_id))?;

        // Endpoint names are resolved before the row disappears; while a
        // connection lives, its ports do too.
        let port_out = self
            .wire_name(conn.group_out_id, conn.port_out_id)
            .unwrap_or_default();
        let port_in = self
            .wire_name(conn.group_in_id, conn.port_in_id)
            .unwrap_or_default();

        self.connections.retain(|c| c.connection_id != connection_id);
        self.record(GraphEvent::ConnectionRemoved {
            connection_id,
            port_out,
            port_in,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Split / join
    // -----------------------------------------------------------------------

    /// Re-represent one group as two direction-specific nodes.
    ///
    /// The store tears the whole subtree down and rebuilds it with the
    /// opposite split flag rather than migrating in place: the two
    /// representations can then never temporarily disagree on port or
    /// connection membership. Split/join is rare and user-initiated, so the
    /// re-emitted child events are an accepted cost; the batch markers let
    /// consumers treat the replay as one unit.
    pub fn split_group(&mut self, group_id: u32) -> Result<(), GraphError> {
        let group = self.group(group_id).ok_or(GraphError::GroupNotFound(group_id))?;
        if group.split {
            return Err(GraphError::AlreadySplit(group_id));
        }
        self.rebuild_group(group_id, SplitHint::Yes)
    }

    /// Collapse a split group back into a single node.
    pub fn join_group(&mut self, group_id: u32) -> Result<(), GraphError> {
        let group = self.group(group_id).ok_or(GraphError::GroupNotFound(group_id))?;
        if !group.split {
            return Err(GraphError::NotSplit(group_id));
        }
        self.rebuild_group(group_id, SplitHint::No)
    }

    fn snapshot_group(&self, group_id: u32) -> Option<GroupSnapshot> {
        Some(GroupSnapshot {
            group: self.group(group_id)?.clone(),
            ports: self
                .ports
                .iter()
                .filter(|p| p.group_id == group_id)
                .cloned()
                .collect(),
            portgroups: self
                .portgroups
                .iter()
                .filter(|pg| pg.group_id == group_id)
                .cloned()
                .collect(),
            connections: self
                .connections
                .iter()
                .filter(|c| c.group_out_id == group_id || c.group_in_id == group_id)
                .copied()
                .collect(),
        })
    }

    fn rebuild_group(&mut self, group_id: u32, split: SplitHint) -> Result<(), GraphError> {
        let snap = self
            .snapshot_group(group_id)
            .ok_or(GraphError::GroupNotFound(group_id))?;

        self.record(GraphEvent::BatchBegin);

        // Teardown, as ordinary removals.
        for conn in &snap.connections {
            self.disconnect(conn.connection_id)?;
        }
        for pg in &snap.portgroups {
            self.remove_port_group(group_id, pg.portgrp_id)?;
        }
        for port in &snap.ports {
            self.remove_port(group_id, port.port_id)?;
        }
        self.remove_group(group_id)?;

        // Re-create with the opposite split flag, preserving identity.
        self.add_group(
            group_id,
            snap.group.name.clone(),
            split,
            snap.group.icon_type,
            snap.group.icon_name.clone(),
        )?;
        if snap.group.handle_client_gui {
            self.set_optional_gui_state(group_id, snap.group.gui_visible)?;
        }
        if snap.group.plugin_id != NO_PLUGIN {
            self.set_group_as_plugin(group_id, snap.group.plugin_id)?;
        }

        // Replay the subtree under its original ids.
        for port in snap.ports {
            self.insert_port(Port {
                portgroup_id: 0,
                ..port
            })?;
        }
        for pg in snap.portgroups {
            self.add_port_group(group_id, pg.portgrp_id, pg.mode, pg.kind, pg.port_ids)?;
        }
        for conn in snap.connections {
            self.connect(
                conn.connection_id,
                conn.group_out_id,
                conn.port_out_id,
                conn.group_in_id,
                conn.port_in_id,
            )?;
        }

        self.record(GraphEvent::BatchEnd);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Full teardown
    // -----------------------------------------------------------------------

    /// Remove everything, in dependency order, emitting ordinary removal
    /// events throughout. Used when the source goes away and on full resync.
    pub fn clear(&mut self) {
        let connection_ids: Vec<u32> =
            self.connections.iter().map(|c| c.connection_id).collect();
        for id in connection_ids {
            if let Err(e) = self.disconnect(id) {
                warn!(connection_id = id, error = %e, "clear: disconnect failed");
            }
        }

        let portgrp_keys: Vec<(u32, u32)> = self
            .portgroups
            .iter()
            .map(|pg| (pg.group_id, pg.portgrp_id))
            .collect();
        for (gid, pgid) in portgrp_keys {
            if let Err(e) = self.remove_port_group(gid, pgid) {
                warn!(group_id = gid, portgrp_id = pgid, error = %e, "clear: remove port-group failed");
            }
        }

        let port_keys: Vec<(u32, u32)> = self
            .ports
            .iter()
            .map(|p| (p.group_id, p.port_id))
            .collect();
        for (gid, pid) in port_keys {
            if let Err(e) = self.remove_port(gid, pid) {
                warn!(group_id = gid, port_id = pid, error = %e, "clear: remove port failed");
            }
        }

        let group_ids: Vec<u32> = self.groups.iter().map(|g| g.group_id).collect();
        for gid in group_ids {
            if let Err(e) = self.remove_group(gid) {
                warn!(group_id = gid, error = %e, "clear: remove group failed");
            }
        }

        self.last_connection_id = 0;
    }
}

//! Canonical graph model
//!
//! The store in this module is the single authority on graph state: groups
//! (one per audio client), their ports, port-groups (adjacent same-direction
//! pairs treated as one unit), and the connections between ports. Everything
//! observers ever see is derived from it.
//!
//! The store is deliberately synchronous and self-contained: one sequential
//! owner applies mutations, every operation validates before it touches
//! anything, and each logical effect is recorded as a [`GraphEvent`] for the
//! sync hub to drain. Because validation always precedes mutation there is
//! no rollback path; a failed operation leaves the store exactly as it was.

pub mod store;

pub use store::GraphStore;

use thiserror::Error;

/// Direction of a port, seen from its owning client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    Output,
    Input,
}

/// Signal type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Midi,
    Cv,
}

/// Icon class of a group's box. Hardware-class groups default to split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconType {
    Application,
    Hardware,
    Plugin,
}

/// Split preference passed to [`GraphStore::add_group`].
///
/// `Undefined` lets the store decide from the icon class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitHint {
    Yes,
    No,
    Undefined,
}

/// Alias slot selector for [`GraphStore::set_port_alias`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasSlot {
    First,
    Second,
}

impl AliasSlot {
    /// Wire encoding (1 or 2).
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }
}

/// Opaque handle to a presentation-layer node slot.
///
/// The store only allocates and retires these; what a node looks like is the
/// renderer's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub u64);

/// Sentinel for "no plugin association". Kept as a raw `i32` because the
/// plugin host's renumbering contract does arithmetic on these ids.
pub const NO_PLUGIN: i32 = -1;

/// Plugin ids above this are reserved by the host and exempt from
/// renumbering.
pub const MAX_PLUGIN_ID: i32 = 999;

/// One audio client, rendered as one box, or two when split.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub group_id: u32,
    pub name: String,
    pub icon_type: IconType,
    pub icon_name: String,
    pub split: bool,
    pub plugin_id: i32,
    pub handle_client_gui: bool,
    pub gui_visible: bool,
    /// Slot 0 is the output-side node (and the only node when unsplit);
    /// slot 1 is the input-side node of a split group.
    pub(crate) nodes: [Option<NodeRef>; 2],
}

impl Group {
    /// The node that renders ports of `mode`.
    ///
    /// An unsplit group answers its single node for both directions.
    pub fn node_for(&self, mode: PortMode) -> Option<NodeRef> {
        if self.split && mode == PortMode::Input {
            self.nodes[1]
        } else {
            self.nodes[0]
        }
    }

    pub fn has_plugin(&self) -> bool {
        self.plugin_id != NO_PLUGIN
    }
}

/// One port. `(group_id, port_id)` is globally unique; the full wire name is
/// `"<group name>:<port name>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub group_id: u32,
    pub port_id: u32,
    pub name: String,
    pub mode: PortMode,
    pub kind: PortKind,
    pub is_alternate: bool,
    /// 0 = not a member of any port-group.
    pub portgroup_id: u32,
    pub alias_1: String,
    pub alias_2: String,
    /// The audio server's flag word, passed through to observers.
    pub flags: u32,
}

/// An ordered run of adjacent same-mode, same-kind ports treated as one
/// schedulable unit (e.g. a stereo pair).
#[derive(Debug, Clone, PartialEq)]
pub struct PortGroup {
    pub group_id: u32,
    pub portgrp_id: u32,
    pub mode: PortMode,
    pub kind: PortKind,
    pub port_ids: Vec<u32>,
}

/// One connection from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub connection_id: u32,
    pub group_out_id: u32,
    pub port_out_id: u32,
    pub group_in_id: u32,
    pub port_in_id: u32,
}

/// Wire-facing summary of a port, captured when its event is recorded so the
/// event stays meaningful after the port is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct PortProfile {
    /// Full wire name, `"<group name>:<port name>"`.
    pub name: String,
    pub alias_1: String,
    pub alias_2: String,
    pub kind: PortKind,
    pub flags: u32,
}

/// One change to the graph. Events are recorded in mutation order and
/// drained by the store's owner; the order is total across all entities.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    GroupAdded {
        group_id: u32,
    },
    GroupRenamed {
        group_id: u32,
    },
    GroupRemoved {
        group_id: u32,
    },
    PortAdded {
        group_id: u32,
        port_id: u32,
        profile: PortProfile,
    },
    PortRenamed {
        group_id: u32,
        port_id: u32,
        old_name: String,
        new_name: String,
    },
    PortRemoved {
        group_id: u32,
        port_id: u32,
        name: String,
    },
    PortGroupAdded {
        group_id: u32,
        portgrp_id: u32,
    },
    PortGroupRemoved {
        group_id: u32,
        portgrp_id: u32,
    },
    ConnectionAdded {
        connection_id: u32,
        port_out: String,
        port_in: String,
    },
    ConnectionRemoved {
        connection_id: u32,
        port_out: String,
        port_in: String,
    },
    /// Brackets a split/join replay so downstream consumers may elide
    /// intermediate redraws and pace the burst as one unit.
    BatchBegin,
    BatchEnd,
}

/// Why a graph operation was rejected. None of these are fatal: the store is
/// untouched whenever one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("group {0} not found")]
    GroupNotFound(u32),
    #[error("port {1} not found in group {0}")]
    PortNotFound(u32, u32),
    #[error("port-group {1} not found in group {0}")]
    PortGroupNotFound(u32, u32),
    #[error("connection {0} not found")]
    ConnectionNotFound(u32),

    #[error("group {0} already exists")]
    GroupExists(u32),
    #[error("port {1} already exists in group {0}")]
    PortExists(u32, u32),
    #[error("port-group {1} already exists in group {0}")]
    PortGroupExists(u32, u32),
    #[error("connection {0} already exists")]
    ConnectionExists(u32),

    #[error("port ids {0:?} are not a consecutive run of same-mode, same-kind ports")]
    NotConsecutive(Vec<u32>),
    #[error("port {1} in group {0} already belongs to port-group {2}")]
    AlreadyGrouped(u32, u32, u32),
    #[error("port {1} in group {0} does not match the port-group's mode and kind")]
    MemberMismatch(u32, u32),
    #[error("a port-group needs at least one member port")]
    EmptyPortGroup,
    #[error("port-group id 0 is reserved for ungrouped ports")]
    ReservedPortGroupId,

    #[error("connection endpoint {0}:{1} not found")]
    EndpointNotFound(u32, u32),
    #[error("port {1} in group {0} has the wrong direction for this connection end")]
    PortModeMismatch(u32, u32),

    #[error("port {1} in group {0} is still a member of port-group {2}")]
    PortInPortGroup(u32, u32, u32),
    #[error("port {1} in group {0} still has connections")]
    PortHasConnections(u32, u32),
    #[error("group {0} is already split")]
    AlreadySplit(u32),
    #[error("group {0} is not split")]
    NotSplit(u32),
}

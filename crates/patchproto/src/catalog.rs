//! Typed message catalog
//!
//! Every path the daemon emits or accepts, with its argument signature.
//! Observer-bound traffic lives under `/patchline/gui/`, observer requests
//! under `/patchline/`. Paths are matched exactly; there is no pattern
//! dispatch on this wire.

use crate::osc::{OscArg, OscMessage};

// ---------------------------------------------------------------------------
// Observer -> daemon request paths
// ---------------------------------------------------------------------------

pub const REQ_ANNOUNCE: &str = "/patchline/announce";
pub const REQ_DISANNOUNCE: &str = "/patchline/disannounce";
pub const REQ_CONNECT: &str = "/patchline/connect";
pub const REQ_DISCONNECT: &str = "/patchline/disconnect";
pub const REQ_SET_BUFFER_SIZE: &str = "/patchline/set_buffer_size";
pub const REQ_REFRESH: &str = "/patchline/refresh";
pub const REQ_PORT_SET_ALIAS: &str = "/patchline/port/set_alias";

// ---------------------------------------------------------------------------
// Daemon -> observer paths
// ---------------------------------------------------------------------------

pub const GUI_ANNOUNCE_ACK: &str = "/patchline/gui/announce-ack";
pub const GUI_FAST_TEMP_FILE: &str = "/patchline/gui/fast_temp_file_running";
pub const GUI_BIG_PACKETS: &str = "/patchline/gui/big_packets";
pub const GUI_PORT_ADDED: &str = "/patchline/gui/port_added";
pub const GUI_PORT_RENAMED: &str = "/patchline/gui/port_renamed";
pub const GUI_PORT_REMOVED: &str = "/patchline/gui/port_removed";
pub const GUI_CONNECTION_ADDED: &str = "/patchline/gui/connection_added";
pub const GUI_CONNECTION_REMOVED: &str = "/patchline/gui/connection_removed";
pub const GUI_SERVER_STARTED: &str = "/patchline/gui/server_started";
pub const GUI_SERVER_STOPPED: &str = "/patchline/gui/server_stopped";
pub const GUI_SERVER_LOSE: &str = "/patchline/gui/server_lose";
pub const GUI_SAMPLE_RATE: &str = "/patchline/gui/sample_rate";
pub const GUI_BUFFER_SIZE: &str = "/patchline/gui/buffer_size";
pub const GUI_DSP_LOAD: &str = "/patchline/gui/dsp_load";
pub const GUI_ADD_XRUN: &str = "/patchline/gui/add_xrun";

/// Port type code carried in `port_added` and the snapshot document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PortTypeCode {
    Audio = 0,
    Midi = 1,
    Cv = 2,
}

impl PortTypeCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Audio),
            1 => Some(Self::Midi),
            2 => Some(Self::Cv),
            _ => None,
        }
    }
}

/// Port flag bits carried in `port_added` and the snapshot document.
///
/// The values match the audio server's own flag word so observers can pass
/// them straight through.
pub struct PortFlags;

impl PortFlags {
    pub const IS_INPUT: u32 = 0x1;
    pub const IS_OUTPUT: u32 = 0x2;
    pub const IS_PHYSICAL: u32 = 0x4;
    pub const CAN_MONITOR: u32 = 0x8;
    pub const IS_TERMINAL: u32 = 0x10;
}

/// Every message the daemon sends to observers.
///
/// `into_osc` is the single place each variant's path and argument order is
/// spelled out; tests below pin the signatures.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiMessage {
    /// Initial state reply to `announce`.
    AnnounceAck {
        running: bool,
        sample_rate: i32,
        buffer_size: i32,
    },
    /// Same-host handoff: full snapshot written to this path.
    FastTempFile { path: String },
    /// Paced-burst bracket: `begin` opens a burst, the opposite closes it.
    BigPackets { begin: bool },
    PortAdded {
        name: String,
        alias_1: String,
        alias_2: String,
        type_code: i32,
        flags: i32,
        metadata: String,
    },
    PortRenamed {
        old_name: String,
        new_name: String,
    },
    PortRemoved {
        name: String,
    },
    ConnectionAdded {
        port_out: String,
        port_in: String,
    },
    ConnectionRemoved {
        port_out: String,
        port_in: String,
    },
    ServerStarted,
    ServerStopped,
    ServerLose,
    SampleRate(i32),
    BufferSize(i32),
    DspLoad(i32),
    AddXrun,
}

impl GuiMessage {
    /// The wire path for this message.
    pub fn path(&self) -> &'static str {
        match self {
            Self::AnnounceAck { .. } => GUI_ANNOUNCE_ACK,
            Self::FastTempFile { .. } => GUI_FAST_TEMP_FILE,
            Self::BigPackets { .. } => GUI_BIG_PACKETS,
            Self::PortAdded { .. } => GUI_PORT_ADDED,
            Self::PortRenamed { .. } => GUI_PORT_RENAMED,
            Self::PortRemoved { .. } => GUI_PORT_REMOVED,
            Self::ConnectionAdded { .. } => GUI_CONNECTION_ADDED,
            Self::ConnectionRemoved { .. } => GUI_CONNECTION_REMOVED,
            Self::ServerStarted => GUI_SERVER_STARTED,
            Self::ServerStopped => GUI_SERVER_STOPPED,
            Self::ServerLose => GUI_SERVER_LOSE,
            Self::SampleRate(_) => GUI_SAMPLE_RATE,
            Self::BufferSize(_) => GUI_BUFFER_SIZE,
            Self::DspLoad(_) => GUI_DSP_LOAD,
            Self::AddXrun => GUI_ADD_XRUN,
        }
    }

    /// Build the wire message.
    pub fn into_osc(self) -> OscMessage {
        let path = self.path();
        let args: Vec<OscArg> = match self {
            Self::AnnounceAck {
                running,
                sample_rate,
                buffer_size,
            } => vec![
                OscArg::Int(i32::from(running)),
                OscArg::Int(sample_rate),
                OscArg::Int(buffer_size),
            ],
            Self::FastTempFile { path } => vec![OscArg::Str(path)],
            // 0 opens a burst, 1 closes it
            Self::BigPackets { begin } => vec![OscArg::Int(i32::from(!begin))],
            Self::PortAdded {
                name,
                alias_1,
                alias_2,
                type_code,
                flags,
                metadata,
            } => vec![
                OscArg::Str(name),
                OscArg::Str(alias_1),
                OscArg::Str(alias_2),
                OscArg::Int(type_code),
                OscArg::Int(flags),
                OscArg::Str(metadata),
            ],
            Self::PortRenamed { old_name, new_name } => {
                vec![OscArg::Str(old_name), OscArg::Str(new_name)]
            }
            Self::PortRemoved { name } => vec![OscArg::Str(name)],
            Self::ConnectionAdded { port_out, port_in }
            | Self::ConnectionRemoved { port_out, port_in } => {
                vec![OscArg::Str(port_out), OscArg::Str(port_in)]
            }
            Self::ServerStarted | Self::ServerStopped | Self::ServerLose | Self::AddXrun => {
                Vec::new()
            }
            Self::SampleRate(v) | Self::BufferSize(v) | Self::DspLoad(v) => {
                vec![OscArg::Int(v)]
            }
        };

        OscMessage::with_args(path, args)
    }
}

//! Graph source boundary
//!
//! The live audio subsystem sits behind this seam. It reports what happened
//! to the real graph as a stream of [`SourceEvent`]s, and accepts the small
//! set of commands observers are allowed to issue through
//! [`SourceControl`]. The daemon mirrors events into the graph store before
//! anything is broadcast, so the store is always the one source of truth
//! observers ever see.
//!
//! Ports and connections are identified by full wire name
//! (`"client:port"`) on this boundary; the store assigns and owns the
//! numeric ids.

use async_trait::async_trait;
use tracing::info;

use crate::graph::PortKind;

/// One report from the audio subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The audio server is up (again). Carries its current parameters.
    Started { sample_rate: i32, buffer_size: i32 },
    /// The audio server stopped in an orderly way.
    Stopped,
    /// Contact with the audio server was lost entirely.
    Lost,
    SampleRateChanged(i32),
    BufferSizeChanged(i32),
    /// Percent DSP load sample.
    DspLoad(i32),
    Xrun,
    PortAppeared {
        name: String,
        kind: PortKind,
        flags: u32,
    },
    PortDisappeared {
        name: String,
    },
    PortRenamed {
        old_name: String,
        new_name: String,
    },
    ConnectionAppeared {
        port_out: String,
        port_in: String,
    },
    ConnectionDisappeared {
        port_out: String,
        port_in: String,
    },
}

/// Commands forwarded from observers to the audio subsystem.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn connect_ports(&self, port_out: &str, port_in: &str) -> anyhow::Result<()>;
    async fn disconnect_ports(&self, port_out: &str, port_in: &str) -> anyhow::Result<()>;
    async fn set_buffer_size(&self, frames: i32) -> anyhow::Result<()>;
    /// Re-report the complete current graph as a fresh event sequence.
    async fn refresh(&self) -> anyhow::Result<()>;
}

/// Stand-in control used when no audio backend is attached (dry runs,
/// tests). Commands are logged and dropped.
#[derive(Debug, Default)]
pub struct NullSource;

#[async_trait]
impl SourceControl for NullSource {
    async fn connect_ports(&self, port_out: &str, port_in: &str) -> anyhow::Result<()> {
        info!(port_out, port_in, "no graph source attached, dropping connect");
        Ok(())
    }

    async fn disconnect_ports(&self, port_out: &str, port_in: &str) -> anyhow::Result<()> {
        info!(port_out, port_in, "no graph source attached, dropping disconnect");
        Ok(())
    }

    async fn set_buffer_size(&self, frames: i32) -> anyhow::Result<()> {
        info!(frames, "no graph source attached, dropping buffer size change");
        Ok(())
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        info!("no graph source attached, nothing to refresh");
        Ok(())
    }
}

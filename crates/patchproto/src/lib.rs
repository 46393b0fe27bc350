//! patchproto - Wire protocol types for the Patchline observer sync stream
//!
//! This crate defines everything that crosses the wire between the Patchline
//! daemon and its observers:
//!
//! - The `osc` module implements an OSC 1.0 content-message codec. The
//!   transport is plain UDP datagrams, one message per datagram, best-effort
//!   by design: the daemon compensates for loss with pacing, never with
//!   retransmission.
//! - The `catalog` module is the typed message catalog: every path the
//!   daemon emits or accepts, with its argument signature, plus the port
//!   type codes and flag bits observers interpret.
//! - The `snapshot` module is the same-host handoff document: when an
//!   observer registers from the daemon's own machine, the full graph is
//!   written to a shared file as JSON and only the file's location travels
//!   over the wire.
//!
//! The split mirrors the two delivery strategies: `catalog` + `osc` cover
//! remote streaming, `snapshot` covers local handoff.

pub mod catalog;
pub mod osc;
pub mod snapshot;

pub use catalog::{GuiMessage, PortFlags, PortTypeCode};
pub use osc::{OscArg, OscError, OscMessage};
pub use snapshot::{SnapshotConnection, SnapshotDocument, SnapshotError, SnapshotPort};

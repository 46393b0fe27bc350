//! patchline - Mirrors a live audio-routing graph to observer GUIs
//!
//! The daemon keeps one canonical, in-memory copy of the audio graph
//! (clients, ports, port pairs, connections) and replicates it to any
//! number of independently-connecting observer processes over a
//! best-effort OSC/UDP transport.
//!
//! ## Architecture
//!
//! ```text
//! graph source ──events──> GraphStore ──change events──> SyncHub
//!                          (validates,                   (fan-out, one
//!                           sole owner)                   paced sender
//!                                                         task per
//!                                                         observer)
//!                                                           │
//! observer requests <── dispatch table <── transport <──────┘
//! ```
//!
//! - [`graph`] is the canonical store with its structural invariants,
//!   including the reversible split/join rebuild.
//! - [`sync`] keeps observers consistent: local handoff for same-host
//!   observers, paced streaming for remote ones.
//! - [`transport`] is the best-effort UDP boundary; [`dispatch`] turns
//!   inbound datagrams into typed requests through one static path table.
//! - [`source`] is the seam to the live audio subsystem.
//! - [`daemon`] is the single-writer processing loop tying it together.
//!
//! Delivery is deliberately unreliable: loss is countered by pacing and
//! resyncs, never by retransmission.

pub mod daemon;
pub mod dispatch;
pub mod graph;
pub mod source;
pub mod sync;
pub mod transport;

pub use daemon::Daemon;
pub use dispatch::{Dispatcher, ObserverRequest};
pub use graph::{GraphError, GraphEvent, GraphStore};
pub use source::{NullSource, SourceControl, SourceEvent};
pub use sync::{FlowController, SyncHub};
pub use transport::{Transport, UdpTransport};

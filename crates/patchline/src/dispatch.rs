//! Inbound request dispatch
//!
//! Maps each request path to a parse handler through one static table built
//! at startup. A message either parses into a typed [`ObserverRequest`] or
//! is dropped: unknown paths are ignored (observers newer than the daemon
//! are allowed to exist), and signature mismatches are logged per message.

use std::collections::HashMap;
use std::net::SocketAddr;

use patchproto::catalog::{
    REQ_ANNOUNCE, REQ_CONNECT, REQ_DISANNOUNCE, REQ_DISCONNECT, REQ_PORT_SET_ALIAS, REQ_REFRESH,
    REQ_SET_BUFFER_SIZE,
};
use patchproto::OscMessage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::graph::AliasSlot;

/// A parsed observer request, ready for the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverRequest {
    Announce { from: SocketAddr },
    Disannounce { from: SocketAddr },
    Connect { port_out: String, port_in: String },
    Disconnect { port_out: String, port_in: String },
    SetBufferSize { frames: i32 },
    Refresh,
    SetPortAlias {
        port_name: String,
        slot: AliasSlot,
        alias: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("expected argument signature '{expected}', got '{got}'")]
    Signature {
        expected: &'static str,
        got: String,
    },
    #[error("alias slot must be 1 or 2, got {0}")]
    BadAliasSlot(i32),
}

type ParseFn = fn(&OscMessage, SocketAddr) -> Result<ObserverRequest, ParseError>;

/// The static path table. Built once, queried per datagram.
pub struct Dispatcher {
    table: HashMap<&'static str, ParseFn>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut table: HashMap<&'static str, ParseFn> = HashMap::new();
        table.insert(REQ_ANNOUNCE, parse_announce);
        table.insert(REQ_DISANNOUNCE, parse_disannounce);
        table.insert(REQ_CONNECT, parse_connect);
        table.insert(REQ_DISCONNECT, parse_disconnect);
        table.insert(REQ_SET_BUFFER_SIZE, parse_set_buffer_size);
        table.insert(REQ_REFRESH, parse_refresh);
        table.insert(REQ_PORT_SET_ALIAS, parse_set_alias);
        Self { table }
    }

    /// Parse one inbound message. `None` means the message was dropped
    /// (unknown path or bad signature); neither is fatal.
    pub fn dispatch(&self, msg: &OscMessage, from: SocketAddr) -> Option<ObserverRequest> {
        let Some(parse) = self.table.get(msg.path.as_str()) else {
            debug!(path = %msg.path, %from, "ignoring unknown request path");
            return None;
        };

        match parse(msg, from) {
            Ok(request) => Some(request),
            Err(e) => {
                warn!(path = %msg.path, %from, error = %e, "rejecting malformed request");
                None
            }
        }
    }
}

fn check(msg: &OscMessage, expected: &'static str) -> Result<(), ParseError> {
    if msg.has_signature(expected) {
        Ok(())
    } else {
        Err(ParseError::Signature {
            expected,
            got: msg.type_tags()[1..].to_string(),
        })
    }
}

fn parse_announce(msg: &OscMessage, from: SocketAddr) -> Result<ObserverRequest, ParseError> {
    check(msg, "")?;
    Ok(ObserverRequest::Announce { from })
}

fn parse_disannounce(msg: &OscMessage, from: SocketAddr) -> Result<ObserverRequest, ParseError> {
    check(msg, "")?;
    Ok(ObserverRequest::Disannounce { from })
}

fn parse_connect(msg: &OscMessage, _from: SocketAddr) -> Result<ObserverRequest, ParseError> {
    check(msg, "ss")?;
    Ok(ObserverRequest::Connect {
        port_out: msg.string(0).unwrap_or_default().to_string(),
        port_in: msg.string(1).unwrap_or_default().to_string(),
    })
}

fn parse_disconnect(msg: &OscMessage, _from: SocketAddr) -> Result<ObserverRequest, ParseError> {
    check(msg, "ss")?;
    Ok(ObserverRequest::Disconnect {
        port_out: msg.string(0).unwrap_or_default().to_string(),
        port_in: msg.string(1).unwrap_or_default().to_string(),
    })
}

fn parse_set_buffer_size(
    msg: &OscMessage,
    _from: SocketAddr,
) -> Result<ObserverRequest, ParseError> {
    check(msg, "i")?;
    Ok(ObserverRequest::SetBufferSize {
        frames: msg.int(0).unwrap_or_default(),
    })
}

fn parse_refresh(msg: &OscMessage, _from: SocketAddr) -> Result<ObserverRequest, ParseError> {
    check(msg, "")?;
    Ok(ObserverRequest::Refresh)
}

fn parse_set_alias(msg: &OscMessage, _from: SocketAddr) -> Result<ObserverRequest, ParseError> {
    check(msg, "sis")?;
    let raw_slot = msg.int(1).unwrap_or_default();
    let slot = AliasSlot::from_i32(raw_slot).ok_or(ParseError::BadAliasSlot(raw_slot))?;
    Ok(ObserverRequest::SetPortAlias {
        port_name: msg.string(0).unwrap_or_default().to_string(),
        slot,
        alias: msg.string(2).unwrap_or_default().to_string(),
    })
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC failure classes and the retry/resolve/fatal policy they imply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Error classes a metadata server can tag a reply with. All but `Other`
/// are fatal for the whole data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteClass {
    /// The server does not consider this node a registered member.
    UnregisteredDatanode,
    /// The server refuses to serve this node at all.
    DisallowedDatanode,
    /// The server cannot speak our transfer protocol version.
    IncorrectVersion,
    /// Any other server-side failure; retryable.
    Other,
}

impl RemoteClass {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RemoteClass::Other)
    }
}

impl fmt::Display for RemoteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteClass::UnregisteredDatanode => "unregistered datanode",
            RemoteClass::DisallowedDatanode => "disallowed datanode",
            RemoteClass::IncorrectVersion => "incorrect version",
            RemoteClass::Other => "remote error",
        };
        f.write_str(name)
    }
}

/// Anything that can go wrong talking to a metadata server.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection refused by {0}")]
    ConnectRefused(SocketAddr),

    #[error("no route to {0}")]
    NoRoute(SocketAddr),

    #[error("port unreachable at {0}")]
    PortUnreachable(SocketAddr),

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("timed out waiting on {0}")]
    Timeout(SocketAddr),

    #[error("{class} from {addr}: {message}")]
    Remote {
        addr: SocketAddr,
        class: RemoteClass,
        message: String,
    },

    #[error("malformed reply: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl RpcError {
    /// True for the failure classes that suggest the peer's address may
    /// have moved: the caller should schedule a re-resolution.
    pub fn needs_resolve(&self) -> bool {
        matches!(
            self,
            RpcError::ConnectRefused(_)
                | RpcError::NoRoute(_)
                | RpcError::PortUnreachable(_)
                | RpcError::UnknownHost(_)
        )
    }

    /// Timeouts are retried without touching resolution state.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout(_))
    }

    /// The remote error class, if the server tagged the reply with one.
    pub fn remote_class(&self) -> Option<RemoteClass> {
        match self {
            RpcError::Remote { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Map a transport-level I/O failure against `addr` onto our classes.
    pub fn classify_io(err: io::Error, addr: SocketAddr) -> RpcError {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => RpcError::ConnectRefused(addr),
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                RpcError::NoRoute(addr)
            }
            io::ErrorKind::TimedOut => RpcError::Timeout(addr),
            _ => RpcError::Io(err),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

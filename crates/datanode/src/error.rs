// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-node error kinds and the escalation policy attached to them.
//!
//! Session-local failures never leave the supervisor loop; they cause a
//! retry. Two kinds escalate: pair-fatal errors stop one namespace, and
//! node-fatal errors take the whole data node down.

use crate::config::ConfigError;
use crate::storage::StorageError;
use hafs_core::{HostPort, NamespaceId, StorageId};
use hafs_wire::{RemoteClass, RpcError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("namespace layout version {remote} does not match local {local}")]
    LayoutMismatch { local: i32, remote: i32 },

    #[error("metadata servers disagree on layout version: {first} vs {second}")]
    PeerLayoutMismatch { first: i32, second: i32 },

    #[error("registration returned storage id {theirs} but local storage is {ours}")]
    InconsistentStorage { ours: StorageId, theirs: StorageId },

    #[error("unknown namespace {0}")]
    UnknownNamespace(NamespaceId),

    #[error("namespace keyed by {0} is already managed")]
    DuplicateNamespace(HostPort),

    #[error("namespace storage is not set up yet")]
    NotReady,

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NodeError {
    /// The fatal remote class carried by this error, if any. The metadata
    /// server telling us we are unregistered, disallowed, or speaking the
    /// wrong version dooms the whole data node.
    pub fn fatal_remote(&self) -> Option<RemoteClass> {
        match self {
            NodeError::Rpc(e) => e.remote_class().filter(|c| c.is_fatal()),
            _ => None,
        }
    }

    /// Errors that require the whole data node to shut down.
    pub fn is_node_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::LayoutMismatch { .. } | NodeError::PeerLayoutMismatch { .. }
        ) || self.fatal_remote().is_some()
    }

    /// Errors that stop one namespace pair but leave the others serving.
    pub fn is_pair_fatal(&self) -> bool {
        matches!(self, NodeError::InconsistentStorage { .. })
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records exchanged with the metadata servers.

use hafs_core::{NamespaceId, StorageId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the block transfer protocol this node speaks. Sent with every
/// register call; a server that cannot serve it replies `IncorrectVersion`.
pub const TRANSFER_VERSION: u32 = 19;

/// Handshake result: who the namespace is and what format it expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub build_version: String,
    pub layout_version: i32,
    pub namespace_id: NamespaceId,
    /// Creation time of the namespace, used to stamp fresh storage.
    pub c_time: u64,
}

/// The slice of storage state that crosses the wire inside a registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub layout_version: i32,
    pub namespace_id: NamespaceId,
    pub c_time: u64,
}

/// Registration record for this data node. Sent on register; the metadata
/// server returns it with the storage id filled in (minting one if ours was
/// unset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatanodeRegistration {
    /// host:port this node serves block data on.
    pub name: String,
    pub storage_id: StorageId,
    pub info: StorageInfo,
}

impl fmt::Display for DatanodeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.storage_id)
    }
}

/// Severity attached to an error report sent to a metadata server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Informational; the server logs it.
    Notify,
    /// The data node is about to go down.
    Fatal,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers assigned by the metadata servers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer identity of one logical namespace, assigned by its metadata
/// server during the handshake. Zero means "not yet known".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NamespaceId(pub u32);

impl NamespaceId {
    pub const UNKNOWN: NamespaceId = NamespaceId(0);

    /// True once a real id has been handed out by a metadata server.
    pub fn is_known(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NS-{}", self.0)
    }
}

/// Stable identity of this data node's storage, assigned by the first
/// metadata server that registers it and persisted locally afterwards.
/// Empty until then.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(String);

impl StorageId {
    pub fn new(id: impl Into<String>) -> Self {
        StorageId(id.into())
    }

    /// A registration carrying an unset storage id asks the metadata server
    /// to mint one.
    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<unset>")
        } else {
            f.write_str(&self.0)
        }
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque fixed-identity block handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one stored block. The data node never interprets block
/// contents; it only reports identities (and their generation stamps) to
/// the metadata servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    pub num_bytes: u64,
    pub generation: u64,
}

impl Block {
    pub fn new(id: u64, num_bytes: u64, generation: u64) -> Self {
        Block { id, num_bytes, generation }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk_{}_{}", self.id, self.generation)
    }
}

#[cfg(test)]
#[path = "block_tests.rs"]
mod tests;

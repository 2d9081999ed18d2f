// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-namespace distributed-upgrade bookkeeping.
//!
//! Created lazily, one per service pair. The actual upgrade protocol runs
//! in its own subsystem; the pair only arms the manager once a session has
//! registered and shuts it down on cleanup.

use hafs_core::NamespaceId;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub struct UpgradeManager {
    nameservice_id: String,
    namespace_id: NamespaceId,
    started: AtomicBool,
}

impl UpgradeManager {
    pub fn new(nameservice_id: String, namespace_id: NamespaceId) -> Self {
        UpgradeManager {
            nameservice_id,
            namespace_id,
            started: AtomicBool::new(false),
        }
    }

    /// Idempotent: only the first call after creation arms the manager.
    pub fn start_if_needed(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            ns = %self.nameservice_id,
            id = %self.namespace_id,
            "upgrade manager armed; no upgrade in progress"
        );
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            debug!(ns = %self.nameservice_id, "upgrade manager shut down");
        }
    }
}

#[cfg(test)]
#[path = "upgrade_tests.rs"]
mod tests;

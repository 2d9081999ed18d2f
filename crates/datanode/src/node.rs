// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The data node itself: dependency wiring, the process-wide run flag,
//! and the staged shutdown.

use crate::config::{Conf, StartupOption};
use crate::coordinator::CoordinatorFactory;
use crate::error::NodeError;
use crate::manager::NamespaceManager;
use crate::offer::OfferFactory;
use crate::storage::{BlockStore, Scanner, Storage};
use hafs_core::{Block, Clock, NamespaceId};
use hafs_wire::{Connector, Resolver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Loop cadence and deadlines. Production defaults; tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    /// Sleep between serving-loop iterations.
    pub offer_interval: Duration,
    /// Sleep between handshake / coordinator retries.
    pub handshake_retry: Duration,
    /// Floor between re-resolution attempts per endpoint.
    pub resolve_min_interval: Duration,
    /// Deadline for all workers to exit once shutdown starts.
    pub shutdown_timeout: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            offer_interval: Duration::from_secs(5),
            handshake_retry: Duration::from_secs(2),
            resolve_min_interval: crate::endpoint::RESOLVE_MIN_INTERVAL,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Process-wide run flag plus the fatality marker that decides the exit
/// code. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    fatal: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        ShutdownHandle {
            token: CancellationToken::new(),
            fatal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin a graceful shutdown. Idempotent.
    pub fn request(&self) {
        self.token.cancel();
    }

    /// Record a fatal condition and begin shutdown. The process exits
    /// non-zero.
    pub fn request_fatal(&self) {
        self.fatal.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    pub async fn requested(&self) {
        self.token.cancelled().await;
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        ShutdownHandle::new()
    }
}

/// Everything the namespace service machinery depends on. Shared across
/// all pairs; the collaborators carry their own concurrency contracts.
pub struct NodeDeps {
    /// host:port this node serves block data on, reported in
    /// registrations.
    pub local_name: String,
    pub clock: Arc<dyn Clock>,
    pub storage: Arc<dyn Storage>,
    pub block_store: Arc<dyn BlockStore>,
    pub scanner: Option<Arc<dyn Scanner>>,
    pub connector: Arc<dyn Connector>,
    pub resolver: Arc<dyn Resolver>,
    pub coordinators: Arc<dyn CoordinatorFactory>,
    pub offers: Arc<dyn OfferFactory>,
    pub startup: StartupOption,
    pub tunables: Tunables,
    /// Serialises namespace storage recovery across pairs.
    pub storage_gate: Mutex<()>,
    pub shutdown: ShutdownHandle,
}

pub struct DataNode {
    deps: Arc<NodeDeps>,
    manager: Arc<NamespaceManager>,
}

impl DataNode {
    /// Build the pair set from configuration. Pairs are created but not
    /// started.
    pub fn new(conf: &Conf, deps: Arc<NodeDeps>) -> Result<Arc<Self>, NodeError> {
        let manager = NamespaceManager::new(deps.clone());
        for ns_conf in conf.namespace_set()? {
            manager.add(&ns_conf)?;
        }
        Ok(Arc::new(DataNode { deps, manager }))
    }

    pub fn manager(&self) -> &Arc<NamespaceManager> {
        &self.manager
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.deps.shutdown.clone()
    }

    pub fn start(&self) {
        info!(namespaces = self.manager.len(), "starting data node");
        self.manager.start_all();
    }

    pub fn request_shutdown(&self) {
        self.deps.shutdown.request();
    }

    // Block events route by namespace id through the manager.

    pub fn notify_received(
        &self,
        ns: NamespaceId,
        block: Block,
        hint: Option<String>,
    ) -> Result<(), NodeError> {
        self.manager.notify_received(ns, block, hint)
    }

    pub fn notify_deleted(&self, ns: NamespaceId, block: Block) -> Result<(), NodeError> {
        self.manager.notify_deleted(ns, block)
    }

    pub async fn refresh(&self, new_set: &[crate::config::NamespaceConf]) -> Result<(), NodeError> {
        self.manager.refresh(new_set).await
    }

    /// Block until shutdown is requested, then tear everything down.
    /// Returns true when the shutdown was clean.
    pub async fn run(&self) -> bool {
        self.deps.shutdown.requested().await;
        self.shutdown().await
    }

    /// Stop all pairs, join them under the shutdown deadline, clean up.
    pub async fn shutdown(&self) -> bool {
        info!("shutting down data node");
        self.manager.stop_all();
        let deadline = self.deps.tunables.shutdown_timeout;
        if tokio::time::timeout(deadline, self.manager.join_all())
            .await
            .is_err()
        {
            warn!(?deadline, "workers did not exit within the shutdown deadline");
        }
        for pair in self.manager.pairs() {
            pair.clean_up();
        }
        info!("data node shutdown complete");
        !self.deps.shutdown.is_fatal()
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;

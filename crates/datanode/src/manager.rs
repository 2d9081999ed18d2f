// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The collection of service pairs this node runs, keyed by session-0's
//! configured data address.
//!
//! `refresh` is the dynamic reconfiguration primitive: it diffs the
//! current set against a new one, stops-then-joins every removed pair,
//! inserts the added ones, and relies on `start_all` being idempotent.
//! Block-event notifications race `refresh` benignly: they either find
//! the pair and deliver, or surface `UnknownNamespace`.

use crate::config::NamespaceConf;
use crate::error::NodeError;
use crate::node::NodeDeps;
use crate::pair::ServicePair;
use futures_util::future::join_all;
use hafs_core::{Block, HostPort, NamespaceId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::info;

pub struct NamespaceManager {
    me: Weak<NamespaceManager>,
    deps: Arc<NodeDeps>,
    pairs: Mutex<HashMap<HostPort, Arc<ServicePair>>>,
    // Serialises refresh calls against each other; the pairs lock above
    // stays fine-grained so notifications never wait on a refresh.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl NamespaceManager {
    pub fn new(deps: Arc<NodeDeps>) -> Arc<Self> {
        Arc::new_cyclic(|me| NamespaceManager {
            me: me.clone(),
            deps,
            pairs: Mutex::new(HashMap::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Construct and insert a pair for `conf`. The pair is not started.
    pub fn add(&self, conf: &NamespaceConf) -> Result<Arc<ServicePair>, NodeError> {
        let pair = ServicePair::new(conf, self.deps.clone());
        pair.attach_manager(self.me.clone());
        let mut pairs = self.pairs.lock();
        if pairs.contains_key(pair.key()) {
            return Err(NodeError::DuplicateNamespace(pair.key().clone()));
        }
        pairs.insert(pair.key().clone(), pair.clone());
        Ok(pair)
    }

    /// Idempotent removal by namespace id. Returns the removed pair so the
    /// caller can stop and join it.
    pub fn remove(&self, ns: NamespaceId) -> Option<Arc<ServicePair>> {
        let mut pairs = self.pairs.lock();
        let key = pairs
            .iter()
            .find(|(_, p)| p.namespace_id() == ns)
            .map(|(k, _)| k.clone())?;
        pairs.remove(&key)
    }

    /// Idempotent removal of one specific pair object; a different pair
    /// that reused the key is left alone.
    pub(crate) fn forget(&self, pair: &ServicePair) {
        let mut pairs = self.pairs.lock();
        if let Some(existing) = pairs.get(pair.key()) {
            if std::ptr::eq(Arc::as_ptr(existing), pair) {
                pairs.remove(pair.key());
            }
        }
    }

    /// O(n) scan over the live pairs.
    pub fn get(&self, ns: NamespaceId) -> Option<Arc<ServicePair>> {
        self.pairs
            .lock()
            .values()
            .find(|p| p.namespace_id() == ns)
            .cloned()
    }

    pub fn pairs(&self) -> Vec<Arc<ServicePair>> {
        self.pairs.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.lock().is_empty()
    }

    pub fn keys(&self) -> HashSet<HostPort> {
        self.pairs.lock().keys().cloned().collect()
    }

    // ---- block event routing -------------------------------------------

    pub fn notify_received(
        &self,
        ns: NamespaceId,
        block: Block,
        hint: Option<String>,
    ) -> Result<(), NodeError> {
        self.get(ns)
            .ok_or(NodeError::UnknownNamespace(ns))?
            .notify_received(block, hint);
        Ok(())
    }

    pub fn notify_deleted(&self, ns: NamespaceId, block: Block) -> Result<(), NodeError> {
        self.get(ns)
            .ok_or(NodeError::UnknownNamespace(ns))?
            .notify_deleted(block);
        Ok(())
    }

    pub fn report_bad_blocks(&self, ns: NamespaceId, blocks: &[Block]) -> Result<(), NodeError> {
        self.get(ns)
            .ok_or(NodeError::UnknownNamespace(ns))?
            .report_bad_blocks(blocks);
        Ok(())
    }

    pub async fn sync_block(
        &self,
        ns: NamespaceId,
        block: Block,
        targets: &[String],
    ) -> Result<bool, NodeError> {
        let pair = self.get(ns).ok_or(NodeError::UnknownNamespace(ns))?;
        Ok(pair.sync_block(block, targets).await?)
    }

    pub fn schedule_block_report(
        &self,
        ns: NamespaceId,
        delay: Duration,
    ) -> Result<(), NodeError> {
        self.get(ns)
            .ok_or(NodeError::UnknownNamespace(ns))?
            .schedule_block_report(delay);
        Ok(())
    }

    pub fn schedule_all_block_reports(&self, delay: Duration) {
        for pair in self.pairs() {
            pair.schedule_block_report(delay);
        }
    }

    // ---- lifecycle -----------------------------------------------------

    /// Idempotent: only pairs without a supervisor actually start.
    pub fn start_all(&self) {
        for pair in self.pairs() {
            pair.start();
        }
    }

    pub fn stop_all(&self) {
        for pair in self.pairs() {
            pair.stop();
        }
    }

    pub async fn join_all(&self) {
        let pairs = self.pairs();
        join_all(pairs.iter().map(|p| p.join())).await;
    }

    /// Reconcile the pair set against `new_set`. Pairs present in both
    /// stay untouched (same objects, no restart); removed pairs are all
    /// stopped before any is joined, so their shutdowns overlap.
    pub async fn refresh(&self, new_set: &[NamespaceConf]) -> Result<(), NodeError> {
        let _refresh = self.refresh_lock.lock().await;

        let (to_stop, added) = {
            let mut pairs = self.pairs.lock();
            let keep: HashSet<&HostPort> = new_set.iter().map(|c| &c.data_addrs[0]).collect();
            let stop_keys: Vec<HostPort> = pairs
                .keys()
                .filter(|k| !keep.contains(*k))
                .cloned()
                .collect();
            let to_stop: Vec<Arc<ServicePair>> =
                stop_keys.iter().filter_map(|k| pairs.remove(k)).collect();

            let mut added = 0usize;
            for conf in new_set {
                if pairs.contains_key(&conf.data_addrs[0]) {
                    continue;
                }
                let pair = ServicePair::new(conf, self.deps.clone());
                pair.attach_manager(self.me.clone());
                pairs.insert(pair.key().clone(), pair);
                added += 1;
            }
            (to_stop, added)
        };

        info!(removed = to_stop.len(), added, "refreshing namespace set");

        for pair in &to_stop {
            pair.stop();
        }
        for pair in &to_stop {
            pair.join().await;
        }
        // Pairs that never started have no supervisor to clean them up.
        for pair in &to_stop {
            pair.clean_up();
        }

        self.start_all();
        Ok(())
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

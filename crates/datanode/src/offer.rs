// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contract between the namespace service manager and the offer loop.
//!
//! The offer loop proper (heartbeats, block reports, command handling)
//! is its own subsystem. What the manager needs from it is narrow: spawn a
//! worker per registered session, push block events at it, route
//! `sync_block` through the primary only, and stop/join it on the way
//! down. A worker that is not running silently drops events; the pending
//! state it keeps is replayed by the offer subsystem's recovery protocol
//! after a re-registration.

use crate::pair::PrimaryWatch;
use async_trait::async_trait;
use hafs_core::{Block, NamespaceId};
use hafs_wire::{AdminProtocol, DataProtocol, DatanodeRegistration, RpcError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A block event fanned out to both sessions of a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    Received { block: Block, hint: Option<String> },
    Deleted { block: Block },
}

/// Everything a freshly spawned offer worker needs.
pub struct OfferCtx {
    pub nameservice_id: String,
    pub namespace_id: NamespaceId,
    pub role: usize,
    pub registration: DatanodeRegistration,
    pub data: Arc<dyn DataProtocol>,
    pub admin: Arc<dyn AdminProtocol>,
    pub primary: PrimaryWatch,
}

#[async_trait]
pub trait OfferService: Send + Sync {
    /// Deliver a block event. Dropped silently when the worker is not
    /// running.
    fn notify(&self, event: BlockEvent);

    fn report_bad_blocks(&self, blocks: &[Block]);

    fn schedule_block_report(&self, delay: Duration);

    /// Synchronise one block with the namespace. Callers route through the
    /// pair's primary gate; this is never invoked on a standby session.
    async fn sync_block(&self, block: Block, targets: &[String]) -> Result<(), RpcError>;

    fn is_running(&self) -> bool;

    /// Signal the worker to exit. Non-blocking, idempotent.
    fn stop(&self);

    /// Wait for the worker to exit. Idempotent.
    async fn join(&self);
}

pub trait OfferFactory: Send + Sync {
    fn spawn(&self, ctx: OfferCtx) -> Arc<dyn OfferService>;
}

/// Default factory: spawns a `OfferWorker` per session.
#[derive(Default)]
pub struct HeartbeatOfferFactory;

impl OfferFactory for HeartbeatOfferFactory {
    fn spawn(&self, ctx: OfferCtx) -> Arc<dyn OfferService> {
        OfferWorker::spawn(ctx)
    }
}

#[derive(Default)]
struct OfferState {
    received: Mutex<Vec<(Block, Option<String>)>>,
    deleted: Mutex<Vec<Block>>,
    bad_blocks: Mutex<Vec<Block>>,
    sync_requests: Mutex<Vec<Block>>,
    report_delay: Mutex<Option<Duration>>,
}

/// Channel-fed worker holding the pending block-event queues for one
/// session. The heartbeat exchange that flushes them rides the proxies in
/// its own subsystem.
pub struct OfferWorker {
    nameservice_id: String,
    role: usize,
    tx: mpsc::UnboundedSender<BlockEvent>,
    running: Arc<AtomicBool>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    state: Arc<OfferState>,
}

impl OfferWorker {
    pub fn spawn(ctx: OfferCtx) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BlockEvent>();
        let running = Arc::new(AtomicBool::new(true));
        let token = CancellationToken::new();
        let state = Arc::new(OfferState::default());

        let worker_running = running.clone();
        let worker_token = token.clone();
        let worker_state = state.clone();
        let nameservice_id = ctx.nameservice_id.clone();
        let role = ctx.role;
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = worker_token.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(BlockEvent::Received { block, hint }) => {
                            worker_state.received.lock().push((block, hint));
                        }
                        Some(BlockEvent::Deleted { block }) => {
                            worker_state.deleted.lock().push(block);
                        }
                        None => break,
                    },
                }
            }
            worker_running.store(false, Ordering::SeqCst);
            debug!(ns = %ctx.nameservice_id, role = ctx.role, "offer worker exited");
        });

        Arc::new(OfferWorker {
            nameservice_id,
            role,
            tx,
            running,
            token,
            task: Mutex::new(Some(task)),
            state,
        })
    }

    /// Hand the pending queues to the recovery protocol after a
    /// re-registration. Draining resets them.
    pub fn drain_pending(&self) -> (Vec<(Block, Option<String>)>, Vec<Block>) {
        let received = std::mem::take(&mut *self.state.received.lock());
        let deleted = std::mem::take(&mut *self.state.deleted.lock());
        (received, deleted)
    }

    pub fn pending_received(&self) -> usize {
        self.state.received.lock().len()
    }

    pub fn pending_deleted(&self) -> usize {
        self.state.deleted.lock().len()
    }

    pub fn requested_report_delay(&self) -> Option<Duration> {
        *self.state.report_delay.lock()
    }

    pub fn sync_requests(&self) -> Vec<Block> {
        self.state.sync_requests.lock().clone()
    }
}

#[async_trait]
impl OfferService for OfferWorker {
    fn notify(&self, event: BlockEvent) {
        if !self.is_running() {
            return;
        }
        // A send racing the worker's exit loses the event; the recovery
        // protocol replays pending state on re-registration.
        let _ = self.tx.send(event);
    }

    fn report_bad_blocks(&self, blocks: &[Block]) {
        if !self.is_running() {
            return;
        }
        self.state.bad_blocks.lock().extend_from_slice(blocks);
    }

    fn schedule_block_report(&self, delay: Duration) {
        *self.state.report_delay.lock() = Some(delay);
    }

    async fn sync_block(&self, block: Block, _targets: &[String]) -> Result<(), RpcError> {
        self.state.sync_requests.lock().push(block);
        debug!(ns = %self.nameservice_id, role = self.role, %block, "sync requested");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.token.cancel();
    }

    async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "offer_tests.rs"]
mod tests;

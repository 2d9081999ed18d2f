// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One long-lived session: this data node against one metadata server.
//!
//! The session walks IDLE → CONNECTED → REGISTERED → SERVING and falls
//! back to IDLE on stop or error. Its peer session progresses
//! independently; nothing here synchronises across the pair except the
//! shared registration record and namespace info, both owned by the pair.

use crate::endpoint::Endpoint;
use crate::error::NodeError;
use crate::node::NodeDeps;
use crate::offer::{BlockEvent, OfferCtx, OfferService};
use crate::pair::PairState;
use hafs_core::Block;
use hafs_wire::{DataProtocol, ErrorSeverity, TRANSFER_VERSION};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Session {
    role: usize,
    endpoint: Endpoint,
    registered: AtomicBool,
    offer: Mutex<Option<Arc<dyn OfferService>>>,
    shared: Arc<PairState>,
    deps: Arc<NodeDeps>,
}

impl Session {
    pub(crate) fn new(
        role: usize,
        endpoint: Endpoint,
        shared: Arc<PairState>,
        deps: Arc<NodeDeps>,
    ) -> Arc<Self> {
        Arc::new(Session {
            role,
            endpoint,
            registered: AtomicBool::new(false),
            offer: Mutex::new(None),
            shared,
            deps,
        })
    }

    pub fn role(&self) -> usize {
        self.role
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// SERVING means the offer worker is alive, which implies registered.
    pub fn is_serving(&self) -> bool {
        self.offer.lock().as_ref().is_some_and(|o| o.is_running())
    }

    pub fn offer(&self) -> Option<Arc<dyn OfferService>> {
        self.offer.lock().clone()
    }

    /// Handshake against this session's metadata server.
    pub(crate) async fn handshake(&self) -> Result<hafs_wire::NamespaceInfo, NodeError> {
        let (data, _) = self
            .endpoint
            .ensure_proxies(self.deps.connector.as_ref())
            .await?;
        let info = data
            .version_request()
            .await
            .map_err(|e| self.endpoint.note(e))?;
        Ok(info)
    }

    /// Idempotent walk to SERVING. Already-serving sessions return
    /// immediately. With `startup` set, a missing namespace info for the
    /// pair is obtained by handshaking through this session first.
    pub async fn try_bring_up(&self, startup: bool) -> Result<(), NodeError> {
        if self.is_serving() {
            return Ok(());
        }
        let (data, admin) = self
            .endpoint
            .ensure_proxies(self.deps.connector.as_ref())
            .await?;
        if startup && self.shared.namespace_info().is_none() {
            let info = data
                .version_request()
                .await
                .map_err(|e| self.endpoint.note(e))?;
            self.shared.adopt_namespace_info(info)?;
        }
        if !self.is_registered() {
            self.register(data.as_ref()).await?;
        }
        self.start_offer(data, admin);
        Ok(())
    }

    async fn register(&self, data: &dyn DataProtocol) -> Result<(), NodeError> {
        let template = self.shared.registration().ok_or(NodeError::NotReady)?;
        let returned = data
            .register(template, TRANSFER_VERSION)
            .await
            .map_err(|e| self.endpoint.note(e))?;
        self.shared
            .adopt_registration(returned, self.deps.storage.as_ref())?;
        self.registered.store(true, Ordering::SeqCst);
        info!(
            ns = %self.shared.nameservice_id,
            role = self.role,
            peer = %self.endpoint.data_host(),
            "registered with metadata server"
        );
        Ok(())
    }

    fn start_offer(
        &self,
        data: Arc<dyn DataProtocol>,
        admin: Arc<dyn hafs_wire::AdminProtocol>,
    ) {
        let mut slot = self.offer.lock();
        if slot.as_ref().is_some_and(|o| o.is_running()) {
            return;
        }
        let Some(registration) = self.shared.registration() else {
            return;
        };
        let ctx = OfferCtx {
            nameservice_id: self.shared.nameservice_id.clone(),
            namespace_id: self.shared.namespace_id(),
            role: self.role,
            registration,
            data,
            admin,
            primary: self.shared.primary.clone(),
        };
        *slot = Some(self.deps.offers.spawn(ctx));
        debug!(
            ns = %self.shared.nameservice_id,
            role = self.role,
            "offer worker started"
        );
    }

    /// Best-effort report to this session's peer; used on fatal paths
    /// before the pair goes down.
    pub(crate) async fn error_report(
        &self,
        severity: ErrorSeverity,
        message: &str,
    ) -> Result<(), NodeError> {
        let (data, _) = self
            .endpoint
            .ensure_proxies(self.deps.connector.as_ref())
            .await?;
        let registration = self
            .shared
            .registration()
            .unwrap_or_else(|| self.shared.bare_registration(&self.deps));
        data.error_report(&registration, severity, message)
            .await
            .map_err(|e| self.endpoint.note(e))?;
        Ok(())
    }

    /// Abort proxies and signal the offer worker to exit. Non-blocking,
    /// idempotent.
    pub fn stop(&self) {
        self.endpoint.close_proxies();
        let offer = self.offer.lock().clone();
        if let Some(offer) = offer {
            offer.stop();
        }
    }

    /// Wait for the offer worker to exit. Idempotent.
    pub async fn join(&self) {
        let offer = self.offer.lock().take();
        if let Some(offer) = offer {
            offer.join().await;
        }
    }

    /// Stop, join, and forget the registration so the next supervisor tick
    /// brings the session up from scratch.
    pub async fn restart(&self) {
        self.stop();
        self.join().await;
        self.registered.store(false, Ordering::SeqCst);
    }

    pub fn enqueue_received(&self, block: Block, hint: Option<String>) {
        let offer = self.offer.lock().clone();
        if let Some(offer) = offer {
            if offer.is_running() {
                offer.notify(BlockEvent::Received { block, hint });
            }
        }
    }

    pub fn enqueue_deleted(&self, block: Block) {
        let offer = self.offer.lock().clone();
        if let Some(offer) = offer {
            if offer.is_running() {
                offer.notify(BlockEvent::Deleted { block });
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

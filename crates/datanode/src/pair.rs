// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One namespace's service pair: two independent sessions plus a
//! supervisor.
//!
//! The supervisor discovers the published primary, obtains the namespace
//! info through the handshake policy, sets up namespace storage exactly
//! once, then loops: re-resolve endpoints that asked for it, bring both
//! sessions up (session 1 is attempted even when session 0 fails), and
//! sleep a cancellable tick. Fatal conditions escalate: pair-fatal stops
//! this namespace, node-fatal takes the whole data node down.

use crate::coordinator::Coordinator;
use crate::endpoint::Endpoint;
use crate::error::NodeError;
use crate::manager::NamespaceManager;
use crate::node::NodeDeps;
use crate::session::Session;
use crate::upgrade::UpgradeManager;
use futures_util::future::join_all;
use hafs_core::{Block, HostPort, NamespaceId, StorageId, BUILD_VERSION, LAYOUT_VERSION};
use hafs_wire::{DatanodeRegistration, ErrorSeverity, NamespaceInfo, RpcError, StorageInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The single shared primary slot of a pair. `None` means "failover in
/// progress": commands from either peer must be ignored until the next
/// authoritative signal. Written by the supervisor at startup and by the
/// offer layer afterwards; read by the fan-out paths.
#[derive(Clone, Default)]
pub struct PrimaryWatch {
    slot: Arc<Mutex<Option<usize>>>,
}

impl PrimaryWatch {
    /// Record an authoritative primary signal.
    pub fn declare(&self, role: Option<usize>) {
        *self.slot.lock() = role;
    }

    pub fn primary_role(&self) -> Option<usize> {
        *self.slot.lock()
    }

    pub fn is_primary(&self, role: usize) -> bool {
        *self.slot.lock() == Some(role)
    }
}

/// State shared between a pair and its two sessions.
pub(crate) struct PairState {
    pub nameservice_id: String,
    pub token: CancellationToken,
    pub primary: PrimaryWatch,
    namespace_info: Mutex<Option<NamespaceInfo>>,
    registration: Mutex<Option<DatanodeRegistration>>,
}

impl PairState {
    pub(crate) fn new(nameservice_id: String) -> Arc<Self> {
        Arc::new(PairState {
            nameservice_id,
            token: CancellationToken::new(),
            primary: PrimaryWatch::default(),
            namespace_info: Mutex::new(None),
            registration: Mutex::new(None),
        })
    }

    pub(crate) fn namespace_info(&self) -> Option<NamespaceInfo> {
        self.namespace_info.lock().clone()
    }

    pub(crate) fn namespace_id(&self) -> NamespaceId {
        self.namespace_info
            .lock()
            .as_ref()
            .map(|i| i.namespace_id)
            .unwrap_or(NamespaceId::UNKNOWN)
    }

    /// Accept a handshake result for the pair. The layout version must
    /// match what this node writes; a build-version skew is only a
    /// warning. First writer wins.
    pub(crate) fn adopt_namespace_info(&self, info: NamespaceInfo) -> Result<(), NodeError> {
        if info.layout_version != LAYOUT_VERSION {
            return Err(NodeError::LayoutMismatch {
                local: LAYOUT_VERSION,
                remote: info.layout_version,
            });
        }
        if info.build_version != BUILD_VERSION {
            warn!(
                ns = %self.nameservice_id,
                ours = BUILD_VERSION,
                theirs = %info.build_version,
                "build version differs from metadata server"
            );
        }
        let mut slot = self.namespace_info.lock();
        if slot.is_none() {
            *slot = Some(info);
        }
        Ok(())
    }

    pub(crate) fn registration(&self) -> Option<DatanodeRegistration> {
        self.registration.lock().clone()
    }

    pub(crate) fn publish_registration(&self, registration: DatanodeRegistration) {
        *self.registration.lock() = Some(registration);
    }

    /// Merge a register reply into the pair's registration. The first
    /// success adopts the server-minted storage id and persists it; later
    /// replies must agree with it.
    pub(crate) fn adopt_registration(
        &self,
        returned: DatanodeRegistration,
        storage: &dyn crate::storage::Storage,
    ) -> Result<(), NodeError> {
        let mut slot = self.registration.lock();
        let Some(current) = slot.as_mut() else {
            return Err(NodeError::NotReady);
        };
        if !current.storage_id.is_set() {
            storage.adopt_storage_id(&returned.storage_id)?;
            info!(
                ns = %self.nameservice_id,
                storage_id = %returned.storage_id,
                "adopted registration from metadata server"
            );
            *current = returned;
            Ok(())
        } else if current.storage_id != returned.storage_id {
            Err(NodeError::InconsistentStorage {
                ours: current.storage_id.clone(),
                theirs: returned.storage_id,
            })
        } else {
            Ok(())
        }
    }

    /// Registration stub for error reports sent before storage setup.
    pub(crate) fn bare_registration(&self, deps: &NodeDeps) -> DatanodeRegistration {
        DatanodeRegistration {
            name: deps.local_name.clone(),
            storage_id: StorageId::default(),
            info: StorageInfo::default(),
        }
    }
}

pub struct ServicePair {
    me: Weak<ServicePair>,
    key: HostPort,
    nameservice_id: String,
    default_addr: HostPort,
    state: Arc<PairState>,
    sessions: [Arc<Session>; 2],
    coordinator: Arc<dyn Coordinator>,
    deps: Arc<NodeDeps>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
    cleaned: AtomicBool,
    upgrade: Mutex<Option<Arc<UpgradeManager>>>,
    manager: Mutex<Weak<NamespaceManager>>,
}

impl ServicePair {
    pub fn new(conf: &crate::config::NamespaceConf, deps: Arc<NodeDeps>) -> Arc<Self> {
        let state = PairState::new(conf.nameservice_id.clone());
        let endpoint = |i: usize| {
            Endpoint::new(
                conf.data_addrs[i].clone(),
                conf.admin_addrs[i].clone(),
                deps.resolver.as_ref(),
                deps.clock.as_ref(),
                deps.tunables.resolve_min_interval,
            )
        };
        let sessions = [
            Session::new(0, endpoint(0), state.clone(), deps.clone()),
            Session::new(1, endpoint(1), state.clone(), deps.clone()),
        ];
        let coordinator = deps.coordinators.create();
        Arc::new_cyclic(|me| ServicePair {
            me: me.clone(),
            key: conf.data_addrs[0].clone(),
            nameservice_id: conf.nameservice_id.clone(),
            default_addr: conf.default_addr.clone(),
            state,
            sessions,
            coordinator,
            deps,
            supervisor: Mutex::new(None),
            initialized: AtomicBool::new(false),
            cleaned: AtomicBool::new(false),
            upgrade: Mutex::new(None),
            manager: Mutex::new(Weak::new()),
        })
    }

    /// Session-0's configured data address: the pair's identity in the
    /// namespace manager.
    pub fn key(&self) -> &HostPort {
        &self.key
    }

    pub fn nameservice_id(&self) -> &str {
        &self.nameservice_id
    }

    pub fn namespace_id(&self) -> NamespaceId {
        self.state.namespace_id()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn session(&self, role: usize) -> &Arc<Session> {
        &self.sessions[role]
    }

    pub fn primary_role(&self) -> Option<usize> {
        self.state.primary.primary_role()
    }

    pub fn is_primary(&self, session: &Session) -> bool {
        self.state.primary.is_primary(session.role())
    }

    /// Authoritative primary signal from the offer layer. `None` records a
    /// failover in progress.
    pub fn set_primary(&self, role: Option<usize>) {
        self.state.primary.declare(role);
    }

    pub(crate) fn attach_manager(&self, manager: Weak<NamespaceManager>) {
        *self.manager.lock() = manager;
    }

    /// Spawn the supervisor. Idempotent; a stopped pair stays stopped.
    pub fn start(&self) {
        let mut slot = self.supervisor.lock();
        if slot.is_some() || self.state.token.is_cancelled() {
            return;
        }
        let Some(pair) = self.me.upgrade() else { return };
        info!(ns = %self.nameservice_id, "starting namespace service pair");
        *slot = Some(tokio::spawn(pair.run()));
    }

    /// Clear the run flag, abort both sessions, shut down the coordinator
    /// client. Non-blocking, idempotent.
    pub fn stop(&self) {
        let first = !self.state.token.is_cancelled();
        self.state.token.cancel();
        for session in &self.sessions {
            session.stop();
        }
        if first {
            self.coordinator.shutdown();
            info!(ns = %self.nameservice_id, "namespace service pair stopping");
        }
    }

    /// Wait for both sessions and the supervisor to exit. Idempotent.
    pub async fn join(&self) {
        join_all(self.sessions.iter().map(|s| s.join())).await;
        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
    }

    /// Release everything owned on behalf of this namespace. Runs from the
    /// supervisor's terminal path and again from `stop_all`; only the
    /// first call acts. Collaborator failures are logged, never rethrown.
    pub fn clean_up(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        // A pair that died on its own (pair-fatal error) was never
        // externally stopped; release its coordinator client here too.
        self.coordinator.shutdown();
        if let Some(upgrade) = self.upgrade.lock().take() {
            upgrade.shutdown();
        }
        if let Some(manager) = self.manager.lock().upgrade() {
            manager.forget(self);
        }
        let ns = self.state.namespace_id();
        if ns.is_known() {
            if let Some(scanner) = &self.deps.scanner {
                scanner.remove_namespace(ns);
            }
            if let Err(e) = self.deps.block_store.remove_namespace(ns) {
                warn!(%ns, error = %e, "block store cleanup failed");
            }
            if let Err(e) = self.deps.storage.remove_namespace(ns) {
                warn!(%ns, error = %e, "storage cleanup failed");
            }
        }
        debug!(ns = %self.nameservice_id, "namespace service pair cleaned up");
    }

    // ---- block event fan-out -------------------------------------------

    /// Deliver to both sessions: a newly elected primary may need either.
    pub fn notify_received(&self, block: Block, hint: Option<String>) {
        for session in &self.sessions {
            session.enqueue_received(block, hint.clone());
        }
    }

    pub fn notify_deleted(&self, block: Block) {
        for session in &self.sessions {
            session.enqueue_deleted(block);
        }
    }

    pub fn report_bad_blocks(&self, blocks: &[Block]) {
        for session in &self.sessions {
            if let Some(offer) = session.offer() {
                if offer.is_running() {
                    offer.report_bad_blocks(blocks);
                }
            }
        }
    }

    pub fn schedule_block_report(&self, delay: Duration) {
        for session in &self.sessions {
            if let Some(offer) = session.offer() {
                if offer.is_running() {
                    offer.schedule_block_report(delay);
                }
            }
        }
    }

    /// Route a block sync through the current primary. `Ok(false)` means
    /// no primary is declared and nothing was attempted.
    pub async fn sync_block(&self, block: Block, targets: &[String]) -> Result<bool, RpcError> {
        let Some(role) = self.state.primary.primary_role() else {
            return Ok(false);
        };
        let Some(offer) = self.sessions[role].offer() else {
            return Ok(false);
        };
        if !offer.is_running() {
            return Ok(false);
        }
        offer.sync_block(block, targets).await?;
        Ok(true)
    }

    // ---- supervisor ----------------------------------------------------

    async fn run(self: Arc<Self>) {
        self.run_inner().await;
        for session in &self.sessions {
            session.stop();
        }
        join_all(self.sessions.iter().map(|s| s.join())).await;
        self.clean_up();
    }

    async fn run_inner(&self) {
        let Some(primary_role) = self.discover_primary().await else {
            return;
        };
        self.state.primary.declare(primary_role);

        let Some(info) = self.initial_handshake(primary_role).await else {
            return;
        };

        // Namespace storage setup, exactly once per pair, serialised with
        // every other pair by the node-wide storage gate. No awaits while
        // the gate is held.
        let setup = {
            let _gate = self.deps.storage_gate.lock();
            self.setup_storage(&info)
        };
        let ns_dir = match setup {
            Ok(dir) => dir,
            Err(e) => {
                error!(ns = %self.nameservice_id, error = %e, "namespace storage setup failed");
                self.state.token.cancel();
                return;
            }
        };

        let mut storage_info = self.deps.storage.info();
        storage_info.namespace_id = info.namespace_id;
        self.state.publish_registration(DatanodeRegistration {
            name: self.deps.local_name.clone(),
            storage_id: self.deps.storage.storage_id(),
            info: storage_info,
        });

        if let Err(e) = self.deps.block_store.add_namespace(info.namespace_id, &ns_dir) {
            error!(ns = %self.nameservice_id, error = %e, "block store rejected namespace");
            self.state.token.cancel();
            return;
        }
        if let Some(scanner) = &self.deps.scanner {
            scanner.add_namespace(info.namespace_id);
        }

        // Registration & serving loop.
        while !self.state.token.is_cancelled() {
            self.resolve_pass().await;

            let before = [
                self.sessions[0].is_registered(),
                self.sessions[1].is_registered(),
            ];
            for session in &self.sessions {
                if self.state.token.is_cancelled() {
                    return;
                }
                // Session 1 is attempted even when session 0 failed.
                if let Err(e) = session.try_bring_up(false).await {
                    self.handle_session_error(session.role(), e).await;
                }
            }
            let newly_registered = self
                .sessions
                .iter()
                .enumerate()
                .any(|(i, s)| s.is_registered() && !before[i]);
            if newly_registered {
                if !self.initialized.swap(true, Ordering::SeqCst) {
                    info!(
                        ns = %self.nameservice_id,
                        id = %self.state.namespace_id(),
                        "namespace initialized"
                    );
                }
                self.upgrade_manager().start_if_needed();
            }

            self.sleep(self.deps.tunables.offer_interval).await;
        }
    }

    fn setup_storage(&self, info: &NamespaceInfo) -> Result<std::path::PathBuf, NodeError> {
        let storage = self.deps.storage.as_ref();
        storage.recover_transition(info, self.deps.startup)?;
        let dir = storage.recover_namespace(info, self.deps.startup)?;
        Ok(dir)
    }

    /// Ask the coordinator who is primary. Outer `None` means the pair was
    /// stopped while waiting.
    async fn discover_primary(&self) -> Option<Option<usize>> {
        loop {
            if self.state.token.is_cancelled() {
                return None;
            }
            match self.coordinator.primary_for(&self.default_addr).await {
                Ok(Some(addr)) => {
                    for (role, session) in self.sessions.iter().enumerate() {
                        if *session.endpoint().data_host() == addr {
                            info!(
                                ns = %self.nameservice_id,
                                role,
                                primary = %addr,
                                "coordinator published primary"
                            );
                            return Some(Some(role));
                        }
                    }
                    warn!(
                        ns = %self.nameservice_id,
                        primary = %addr,
                        "published primary matches neither configured endpoint"
                    );
                    return Some(None);
                }
                Ok(None) => {
                    info!(ns = %self.nameservice_id, "no primary currently published");
                    return Some(None);
                }
                Err(e) => {
                    warn!(ns = %self.nameservice_id, error = %e, "coordinator lookup failed, retrying");
                    if !self.sleep(self.deps.tunables.handshake_retry).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Obtain the namespace info per the handshake policy: through the
    /// published primary when one is known, through both peers (whose
    /// layout versions must agree) when none is. Loops until success or
    /// the pair is stopped; fatal conditions escalate and return `None`.
    async fn initial_handshake(&self, primary: Option<usize>) -> Option<NamespaceInfo> {
        loop {
            if self.state.token.is_cancelled() {
                return None;
            }
            let attempt = match primary {
                Some(role) => self.sessions[role].handshake().await,
                None => self.handshake_both().await,
            };
            match attempt {
                Ok(info) => match self.state.adopt_namespace_info(info.clone()) {
                    Ok(()) => {
                        info!(
                            ns = %self.nameservice_id,
                            id = %info.namespace_id,
                            layout = info.layout_version,
                            "handshake complete"
                        );
                        return Some(info);
                    }
                    Err(err) => {
                        error!(ns = %self.nameservice_id, error = %err, "handshake rejected");
                        self.report_and_die(&err.to_string()).await;
                        return None;
                    }
                },
                Err(err) if err.is_node_fatal() => {
                    error!(ns = %self.nameservice_id, error = %err, "fatal handshake failure");
                    if matches!(err, NodeError::PeerLayoutMismatch { .. }) {
                        self.report_and_die(&err.to_string()).await;
                    } else {
                        self.deps.shutdown.request_fatal();
                        self.state.token.cancel();
                    }
                    return None;
                }
                Err(NodeError::Rpc(e)) if e.is_timeout() => {
                    debug!(ns = %self.nameservice_id, error = %e, "handshake timed out, retrying");
                }
                Err(NodeError::Rpc(e)) if e.needs_resolve() => {
                    info!(ns = %self.nameservice_id, error = %e, "metadata server unreachable, retrying");
                }
                Err(err) => {
                    warn!(ns = %self.nameservice_id, error = %err, "handshake failed, retrying");
                }
            }
            if !self.sleep(self.deps.tunables.handshake_retry).await {
                return None;
            }
            self.resolve_pass().await;
        }
    }

    async fn handshake_both(&self) -> Result<NamespaceInfo, NodeError> {
        let first = self.sessions[0].handshake().await;
        let second = self.sessions[1].handshake().await;
        match (first, second) {
            (Ok(a), Ok(b)) => {
                if a.layout_version != b.layout_version {
                    return Err(NodeError::PeerLayoutMismatch {
                        first: a.layout_version,
                        second: b.layout_version,
                    });
                }
                if a.namespace_id != b.namespace_id {
                    warn!(
                        ns = %self.nameservice_id,
                        first = %a.namespace_id,
                        second = %b.namespace_id,
                        "peers report different namespace ids"
                    );
                }
                Ok(a)
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// Stop the session, re-resolve, and leave bring-up to the register
    /// pass, for every endpoint whose resolve cooldown has elapsed.
    async fn resolve_pass(&self) {
        for session in &self.sessions {
            if !session.endpoint().due_for_resolve(self.deps.clock.as_ref()) {
                continue;
            }
            info!(
                ns = %self.nameservice_id,
                role = session.role(),
                peer = %session.endpoint().data_host(),
                "re-resolving metadata server address"
            );
            session.restart().await;
            match session
                .endpoint()
                .maybe_reresolve(self.deps.resolver.as_ref(), self.deps.clock.as_ref())
            {
                Ok(true) => info!(
                    ns = %self.nameservice_id,
                    role = session.role(),
                    "peer address changed"
                ),
                Ok(false) => debug!(
                    ns = %self.nameservice_id,
                    role = session.role(),
                    "peer address unchanged"
                ),
                Err(e) => warn!(
                    ns = %self.nameservice_id,
                    role = session.role(),
                    error = %e,
                    "re-resolution failed"
                ),
            }
        }
    }

    async fn handle_session_error(&self, role: usize, err: NodeError) {
        if err.is_node_fatal() {
            error!(
                ns = %self.nameservice_id,
                role,
                error = %err,
                "fatal error, shutting down data node"
            );
            if matches!(
                err,
                NodeError::LayoutMismatch { .. } | NodeError::PeerLayoutMismatch { .. }
            ) {
                self.report_peers(&err.to_string()).await;
            }
            self.deps.shutdown.request_fatal();
            self.state.token.cancel();
        } else if err.is_pair_fatal() {
            error!(
                ns = %self.nameservice_id,
                role,
                error = %err,
                "unrecoverable session failure, stopping namespace"
            );
            self.state.token.cancel();
        } else {
            match &err {
                NodeError::Rpc(e) if e.is_timeout() => {
                    debug!(ns = %self.nameservice_id, role, error = %e, "session call timed out")
                }
                _ => info!(
                    ns = %self.nameservice_id,
                    role,
                    error = %err,
                    "session bring-up failed, will retry"
                ),
            }
        }
    }

    async fn report_and_die(&self, message: &str) {
        self.report_peers(message).await;
        self.deps.shutdown.request_fatal();
        self.state.token.cancel();
    }

    /// Best-effort: one delivered report is enough.
    async fn report_peers(&self, message: &str) {
        for session in &self.sessions {
            if session
                .error_report(ErrorSeverity::Notify, message)
                .await
                .is_ok()
            {
                return;
            }
        }
        warn!(ns = %self.nameservice_id, "could not deliver error report to either peer");
    }

    fn upgrade_manager(&self) -> Arc<UpgradeManager> {
        let mut slot = self.upgrade.lock();
        if let Some(existing) = slot.as_ref() {
            return existing.clone();
        }
        let created = Arc::new(UpgradeManager::new(
            self.nameservice_id.clone(),
            self.state.namespace_id(),
        ));
        *slot = Some(created.clone());
        created
    }

    /// Cancellable sleep; false when the pair was stopped while sleeping.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.state.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
#[path = "pair_tests.rs"]
mod tests;

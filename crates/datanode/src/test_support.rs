// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes and helpers for exercising the namespace service machinery
//! without a network, a disk, or a coordination service.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use crate::config::NamespaceConf;
use crate::coordinator::{Coordinator, CoordinatorError, CoordinatorFactory};
use crate::node::{NodeDeps, ShutdownHandle, Tunables};
use crate::offer::{BlockEvent, OfferCtx, OfferFactory, OfferService};
use crate::storage::{BlockStore, Scanner, SimulatedStorage, StorageError};
use async_trait::async_trait;
use hafs_core::{Block, FakeClock, HostPort, NamespaceId, StorageId, BUILD_VERSION, LAYOUT_VERSION};
use hafs_wire::{
    AdminProtocol, Connector, DataProtocol, DatanodeRegistration, ErrorSeverity, NamespaceInfo,
    Resolver, RpcError,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handshake result with this node's own build and layout versions.
pub fn default_info(ns: u32) -> NamespaceInfo {
    NamespaceInfo {
        build_version: BUILD_VERSION.to_string(),
        layout_version: LAYOUT_VERSION,
        namespace_id: NamespaceId(ns),
        c_time: 1,
    }
}

/// Namespace configuration over IP-literal peers (so `FakeResolver`
/// resolves them without an explicit table entry).
pub fn ns_conf(label: &str, data0: &str, data1: &str) -> NamespaceConf {
    let data0: HostPort = data0.parse().expect("data0 addr");
    let data1: HostPort = data1.parse().expect("data1 addr");
    let admin0 = data0.with_port(data0.port() + 1);
    let admin1 = data1.with_port(data1.port() + 1);
    NamespaceConf {
        nameservice_id: label.to_string(),
        default_addr: HostPort::new(format!("{label}.logical"), 8020),
        data_addrs: [data0, data1],
        admin_addrs: [admin0, admin1],
    }
}

// ---- metadata server fakes ---------------------------------------------

/// Scripted stand-in for one metadata server's data-protocol endpoint.
pub struct FakeNameNode {
    info: Mutex<NamespaceInfo>,
    minted_id: StorageId,
    forced_id: Mutex<Option<StorageId>>,
    handshake_failures: Mutex<VecDeque<RpcError>>,
    register_failures: Mutex<VecDeque<RpcError>>,
    handshakes: AtomicUsize,
    registers: AtomicUsize,
    error_reports: Mutex<Vec<(ErrorSeverity, String)>>,
}

impl FakeNameNode {
    pub fn new(info: NamespaceInfo) -> Arc<Self> {
        Arc::new(FakeNameNode {
            info: Mutex::new(info),
            minted_id: StorageId::new("DS-1"),
            forced_id: Mutex::new(None),
            handshake_failures: Mutex::new(VecDeque::new()),
            register_failures: Mutex::new(VecDeque::new()),
            handshakes: AtomicUsize::new(0),
            registers: AtomicUsize::new(0),
            error_reports: Mutex::new(Vec::new()),
        })
    }

    pub fn set_info(&self, info: NamespaceInfo) {
        *self.info.lock() = info;
    }

    /// The next handshake fails with `err` (queueable).
    pub fn fail_next_handshake(&self, err: RpcError) {
        self.handshake_failures.lock().push_back(err);
    }

    /// The next register fails with `err` (queueable).
    pub fn fail_next_register(&self, err: RpcError) {
        self.register_failures.lock().push_back(err);
    }

    /// Always return this storage id from register, regardless of what
    /// the registration carried.
    pub fn force_storage_id(&self, id: StorageId) {
        *self.forced_id.lock() = Some(id);
    }

    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn register_count(&self) -> usize {
        self.registers.load(Ordering::SeqCst)
    }

    pub fn error_reports(&self) -> Vec<(ErrorSeverity, String)> {
        self.error_reports.lock().clone()
    }
}

#[async_trait]
impl DataProtocol for FakeNameNode {
    async fn version_request(&self) -> Result<NamespaceInfo, RpcError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.handshake_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self.info.lock().clone())
    }

    async fn register(
        &self,
        registration: DatanodeRegistration,
        _transfer_version: u32,
    ) -> Result<DatanodeRegistration, RpcError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.register_failures.lock().pop_front() {
            return Err(err);
        }
        let mut returned = registration;
        if let Some(forced) = self.forced_id.lock().clone() {
            returned.storage_id = forced;
        } else if !returned.storage_id.is_set() {
            returned.storage_id = self.minted_id.clone();
        }
        Ok(returned)
    }

    async fn error_report(
        &self,
        _registration: &DatanodeRegistration,
        severity: ErrorSeverity,
        message: &str,
    ) -> Result<(), RpcError> {
        self.error_reports.lock().push((severity, message.to_string()));
        Ok(())
    }
}

pub struct FakeAdmin;

#[async_trait]
impl AdminProtocol for FakeAdmin {
    async fn ping(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

/// Dial failure classes a test can script per address.
#[derive(Debug, Clone, Copy)]
pub enum DialFailure {
    Refused,
    NoRoute,
    PortUnreachable,
    UnknownHost,
    Timeout,
}

impl DialFailure {
    fn to_error(self, addr: SocketAddr) -> RpcError {
        match self {
            DialFailure::Refused => RpcError::ConnectRefused(addr),
            DialFailure::NoRoute => RpcError::NoRoute(addr),
            DialFailure::PortUnreachable => RpcError::PortUnreachable(addr),
            DialFailure::UnknownHost => RpcError::UnknownHost(addr.to_string()),
            DialFailure::Timeout => RpcError::Timeout(addr),
        }
    }
}

/// Connector over an in-memory address table.
#[derive(Default)]
pub struct FakeConnector {
    nodes: Mutex<HashMap<SocketAddr, Arc<FakeNameNode>>>,
    dial_failures: Mutex<HashMap<SocketAddr, VecDeque<DialFailure>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeConnector::default())
    }

    pub fn register_node(&self, addr: SocketAddr, node: Arc<FakeNameNode>) {
        self.nodes.lock().insert(addr, node);
    }

    /// Script `count` consecutive dial failures against `addr` (data path).
    pub fn fail_dials(&self, addr: SocketAddr, failure: DialFailure, count: usize) {
        let mut failures = self.dial_failures.lock();
        let queue = failures.entry(addr).or_default();
        for _ in 0..count {
            queue.push_back(failure);
        }
    }

    pub fn clear_dial_failures(&self, addr: SocketAddr) {
        self.dial_failures.lock().remove(&addr);
    }

    fn pop_failure(&self, addr: SocketAddr) -> Option<RpcError> {
        let mut failures = self.dial_failures.lock();
        let queue = failures.get_mut(&addr)?;
        let failure = queue.pop_front()?;
        Some(failure.to_error(addr))
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect_data(&self, addr: SocketAddr) -> Result<Arc<dyn DataProtocol>, RpcError> {
        if let Some(err) = self.pop_failure(addr) {
            return Err(err);
        }
        let node = self.nodes.lock().get(&addr).cloned();
        node.map(|n| n as Arc<dyn DataProtocol>)
            .ok_or(RpcError::ConnectRefused(addr))
    }

    async fn connect_admin(&self, addr: SocketAddr) -> Result<Arc<dyn AdminProtocol>, RpcError> {
        if let Some(err) = self.pop_failure(addr) {
            return Err(err);
        }
        Ok(Arc::new(FakeAdmin))
    }
}

/// Resolver over a mutable table; IP-literal hosts resolve without an
/// entry.
#[derive(Default)]
pub struct FakeResolver {
    table: Mutex<HashMap<HostPort, SocketAddr>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeResolver::default())
    }

    pub fn map(&self, host: HostPort, addr: SocketAddr) {
        self.table.lock().insert(host, addr);
    }

    pub fn unmap(&self, host: &HostPort) {
        self.table.lock().remove(host);
    }
}

impl Resolver for FakeResolver {
    fn resolve(&self, addr: &HostPort) -> Result<SocketAddr, RpcError> {
        if let Some(resolved) = self.table.lock().get(addr) {
            return Ok(*resolved);
        }
        if let Ok(ip) = addr.host().parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, addr.port()));
        }
        Err(RpcError::UnknownHost(addr.to_string()))
    }
}

// ---- coordinator fake ---------------------------------------------------

/// Factory whose created clients all serve one mutable published-primary
/// slot and count their shutdowns.
#[derive(Default)]
pub struct TestCoordinatorFactory {
    primary: Arc<Mutex<Option<HostPort>>>,
    failures: Arc<Mutex<usize>>,
    shutdowns: Arc<AtomicUsize>,
}

impl TestCoordinatorFactory {
    pub fn none() -> Arc<Self> {
        Arc::new(TestCoordinatorFactory::default())
    }

    pub fn publishing(primary: HostPort) -> Arc<Self> {
        let factory = TestCoordinatorFactory::default();
        *factory.primary.lock() = Some(primary);
        Arc::new(factory)
    }

    pub fn set_primary(&self, primary: Option<HostPort>) {
        *self.primary.lock() = primary;
    }

    /// The next `count` lookups fail with `Unavailable`.
    pub fn fail_lookups(&self, count: usize) {
        *self.failures.lock() = count;
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

struct TestCoordinator {
    primary: Arc<Mutex<Option<HostPort>>>,
    failures: Arc<Mutex<usize>>,
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl Coordinator for TestCoordinator {
    async fn primary_for(
        &self,
        _default_addr: &HostPort,
    ) -> Result<Option<HostPort>, CoordinatorError> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(CoordinatorError::Unavailable("scripted outage".to_string()));
            }
        }
        Ok(self.primary.lock().clone())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

impl CoordinatorFactory for TestCoordinatorFactory {
    fn create(&self) -> Arc<dyn Coordinator> {
        Arc::new(TestCoordinator {
            primary: self.primary.clone(),
            failures: self.failures.clone(),
            shutdowns: self.shutdowns.clone(),
        })
    }
}

// ---- offer fakes ---------------------------------------------------------

/// Offer worker that records everything it is handed.
pub struct RecordingOffer {
    pub nameservice_id: String,
    pub role: usize,
    events: Mutex<Vec<BlockEvent>>,
    bad_blocks: Mutex<Vec<Block>>,
    report_delays: Mutex<Vec<Duration>>,
    syncs: Mutex<Vec<Block>>,
    running: AtomicBool,
}

impl RecordingOffer {
    pub fn events(&self) -> Vec<BlockEvent> {
        self.events.lock().clone()
    }

    pub fn bad_blocks(&self) -> Vec<Block> {
        self.bad_blocks.lock().clone()
    }

    pub fn report_delays(&self) -> Vec<Duration> {
        self.report_delays.lock().clone()
    }

    pub fn syncs(&self) -> Vec<Block> {
        self.syncs.lock().clone()
    }
}

#[async_trait]
impl OfferService for RecordingOffer {
    fn notify(&self, event: BlockEvent) {
        if self.is_running() {
            self.events.lock().push(event);
        }
    }

    fn report_bad_blocks(&self, blocks: &[Block]) {
        self.bad_blocks.lock().extend_from_slice(blocks);
    }

    fn schedule_block_report(&self, delay: Duration) {
        self.report_delays.lock().push(delay);
    }

    async fn sync_block(&self, block: Block, _targets: &[String]) -> Result<(), RpcError> {
        self.syncs.lock().push(block);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn join(&self) {}
}

#[derive(Default)]
pub struct RecordingOfferFactory {
    spawned: Mutex<Vec<Arc<RecordingOffer>>>,
}

impl RecordingOfferFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingOfferFactory::default())
    }

    pub fn spawned(&self) -> Vec<Arc<RecordingOffer>> {
        self.spawned.lock().clone()
    }

    /// Most recent worker spawned for `role`, if any.
    pub fn latest(&self, nameservice_id: &str, role: usize) -> Option<Arc<RecordingOffer>> {
        self.spawned
            .lock()
            .iter()
            .rev()
            .find(|o| o.nameservice_id == nameservice_id && o.role == role)
            .cloned()
    }
}

impl OfferFactory for RecordingOfferFactory {
    fn spawn(&self, ctx: OfferCtx) -> Arc<dyn OfferService> {
        let offer = Arc::new(RecordingOffer {
            nameservice_id: ctx.nameservice_id,
            role: ctx.role,
            events: Mutex::new(Vec::new()),
            bad_blocks: Mutex::new(Vec::new()),
            report_delays: Mutex::new(Vec::new()),
            syncs: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        });
        self.spawned.lock().push(offer.clone());
        offer
    }
}

// ---- storage fakes -------------------------------------------------------

#[derive(Default)]
pub struct RecordingBlockStore {
    adds: Mutex<Vec<(NamespaceId, PathBuf)>>,
    removes: Mutex<Vec<NamespaceId>>,
}

impl RecordingBlockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingBlockStore::default())
    }

    pub fn add_count(&self, ns: NamespaceId) -> usize {
        self.adds.lock().iter().filter(|(n, _)| *n == ns).count()
    }

    pub fn remove_count(&self, ns: NamespaceId) -> usize {
        self.removes.lock().iter().filter(|n| **n == ns).count()
    }
}

impl BlockStore for RecordingBlockStore {
    fn add_namespace(&self, ns: NamespaceId, dir: &Path) -> Result<(), StorageError> {
        self.adds.lock().push((ns, dir.to_path_buf()));
        Ok(())
    }

    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError> {
        self.removes.lock().push(ns);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingScanner {
    adds: Mutex<Vec<NamespaceId>>,
    removes: Mutex<Vec<NamespaceId>>,
}

impl RecordingScanner {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingScanner::default())
    }

    pub fn add_count(&self, ns: NamespaceId) -> usize {
        self.adds.lock().iter().filter(|n| **n == ns).count()
    }

    pub fn remove_count(&self, ns: NamespaceId) -> usize {
        self.removes.lock().iter().filter(|n| **n == ns).count()
    }
}

impl Scanner for RecordingScanner {
    fn add_namespace(&self, ns: NamespaceId) {
        self.adds.lock().push(ns);
    }

    fn remove_namespace(&self, ns: NamespaceId) {
        self.removes.lock().push(ns);
    }
}

// ---- harness -------------------------------------------------------------

pub struct TestHarness {
    pub deps: Arc<NodeDeps>,
    pub connector: Arc<FakeConnector>,
    pub resolver: Arc<FakeResolver>,
    pub clock: Arc<FakeClock>,
    pub offers: Arc<RecordingOfferFactory>,
    pub block_store: Arc<RecordingBlockStore>,
    pub scanner: Arc<RecordingScanner>,
    pub storage: Arc<SimulatedStorage>,
    pub coordinators: Arc<TestCoordinatorFactory>,
}

impl TestHarness {
    /// Register both peers of `conf` with the connector, backed by fresh
    /// fake name nodes serving `info`.
    pub fn wire_namespace(
        &self,
        conf: &NamespaceConf,
        info: NamespaceInfo,
    ) -> (Arc<FakeNameNode>, Arc<FakeNameNode>) {
        let node0 = FakeNameNode::new(info.clone());
        let node1 = FakeNameNode::new(info);
        for (role, node) in [(0, &node0), (1, &node1)] {
            let addr = self
                .resolver
                .resolve(&conf.data_addrs[role])
                .expect("data addr must resolve");
            self.connector.register_node(addr, node.clone());
        }
        (node0, node1)
    }

    pub fn data_addr(&self, conf: &NamespaceConf, role: usize) -> SocketAddr {
        self.resolver
            .resolve(&conf.data_addrs[role])
            .expect("data addr must resolve")
    }
}

/// Fast-cadence tunables: tests tick in milliseconds, while the resolve
/// floor stays clock-driven so `FakeClock::advance` exercises it.
pub fn test_tunables() -> Tunables {
    Tunables {
        offer_interval: Duration::from_millis(20),
        handshake_retry: Duration::from_millis(10),
        resolve_min_interval: Duration::from_secs(120),
        shutdown_timeout: Duration::from_secs(5),
    }
}

pub fn harness() -> TestHarness {
    harness_with(TestCoordinatorFactory::none())
}

pub fn harness_with(coordinators: Arc<TestCoordinatorFactory>) -> TestHarness {
    let connector = FakeConnector::new();
    let resolver = FakeResolver::new();
    let clock = Arc::new(FakeClock::new());
    let offers = RecordingOfferFactory::new();
    let block_store = RecordingBlockStore::new();
    let scanner = RecordingScanner::new();
    let storage = Arc::new(SimulatedStorage::new());
    let deps = Arc::new(NodeDeps {
        local_name: "127.0.0.1:50010".to_string(),
        clock: clock.clone(),
        storage: storage.clone(),
        block_store: block_store.clone(),
        scanner: Some(scanner.clone()),
        connector: connector.clone(),
        resolver: resolver.clone(),
        coordinators: coordinators.clone(),
        offers: offers.clone(),
        startup: crate::config::StartupOption::Regular,
        tunables: test_tunables(),
        storage_gate: Mutex::new(()),
        shutdown: ShutdownHandle::new(),
    });
    TestHarness {
        deps,
        connector,
        resolver,
        clock,
        offers,
        block_store,
        scanner,
        storage,
        coordinators,
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

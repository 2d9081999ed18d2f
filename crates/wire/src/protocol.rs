// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side traits for the two RPC paths to a metadata server.

use crate::error::RpcError;
use crate::types::{DatanodeRegistration, ErrorSeverity, NamespaceInfo};
use async_trait::async_trait;
use hafs_core::HostPort;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

/// Data-path RPCs: the calls the namespace service manager itself makes.
/// Heartbeats, block reports, and command replies ride the same proxy but
/// belong to the offer loop.
#[async_trait]
pub trait DataProtocol: Send + Sync {
    /// Handshake: learn who the namespace is and what it expects.
    async fn version_request(&self) -> Result<NamespaceInfo, RpcError>;

    /// Enroll this data node. The returned registration carries the
    /// authoritative storage id.
    async fn register(
        &self,
        registration: DatanodeRegistration,
        transfer_version: u32,
    ) -> Result<DatanodeRegistration, RpcError>;

    /// Best-effort error report; callers ignore the result on shutdown
    /// paths.
    async fn error_report(
        &self,
        registration: &DatanodeRegistration,
        severity: ErrorSeverity,
        message: &str,
    ) -> Result<(), RpcError>;
}

/// Admin-path proxy. Opaque to the service manager: it is dialed together
/// with the data proxy, kept live, and handed to the offer loop.
#[async_trait]
pub trait AdminProtocol: Send + Sync {
    async fn ping(&self) -> Result<(), RpcError>;
}

/// Dials both protocol paths. One implementation per transport; tests plug
/// in fakes here.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_data(&self, addr: SocketAddr) -> Result<Arc<dyn DataProtocol>, RpcError>;
    async fn connect_admin(&self, addr: SocketAddr) -> Result<Arc<dyn AdminProtocol>, RpcError>;
}

/// Name resolution seam. Blocking is acceptable: resolution happens only at
/// construction and on the rate-limited re-resolve path, never under a lock.
pub trait Resolver: Send + Sync {
    fn resolve(&self, addr: &HostPort) -> Result<SocketAddr, RpcError>;
}

/// Resolver backed by the system's name service.
#[derive(Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, addr: &HostPort) -> Result<SocketAddr, RpcError> {
        let mut candidates = (addr.host(), addr.port())
            .to_socket_addrs()
            .map_err(|_| RpcError::UnknownHost(addr.to_string()))?;
        candidates
            .next()
            .ok_or_else(|| RpcError::UnknownHost(addr.to_string()))
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One metadata-server address pair and its proxy lifecycle.
//!
//! The per-endpoint mutex guards proxy creation/teardown and resolve state
//! only. It is never held across a dial or an RPC; dials happen outside
//! the lock and commit both proxies or neither.

use hafs_core::{Clock, HostPort};
use hafs_wire::{AdminProtocol, Connector, DataProtocol, Resolver, RpcError};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Floor between re-resolution attempts for one endpoint. The serving
/// loop's tick on top of this yields at most one re-resolve per endpoint
/// per two minutes.
pub const RESOLVE_MIN_INTERVAL: Duration = Duration::from_secs(120);

struct Proxies {
    data_addr: Option<SocketAddr>,
    admin_addr: Option<SocketAddr>,
    data_proxy: Option<Arc<dyn DataProtocol>>,
    admin_proxy: Option<Arc<dyn AdminProtocol>>,
    needs_resolve: bool,
    last_resolved_at: Instant,
}

pub struct Endpoint {
    data_host: HostPort,
    admin_host: HostPort,
    resolve_min_interval: Duration,
    inner: Mutex<Proxies>,
}

impl Endpoint {
    /// Resolution at construction is best-effort: an endpoint whose name
    /// does not resolve yet starts with `needs_resolve` set and comes up
    /// through the re-resolution path.
    pub fn new(
        data_host: HostPort,
        admin_host: HostPort,
        resolver: &dyn Resolver,
        clock: &dyn Clock,
        resolve_min_interval: Duration,
    ) -> Self {
        let resolved = resolver
            .resolve(&data_host)
            .and_then(|d| resolver.resolve(&admin_host).map(|a| (d, a)));
        let (data_addr, admin_addr, needs_resolve) = match resolved {
            Ok((d, a)) => (Some(d), Some(a), false),
            Err(e) => {
                warn!(peer = %data_host, error = %e, "initial resolution failed");
                (None, None, true)
            }
        };
        Endpoint {
            data_host,
            admin_host,
            resolve_min_interval,
            inner: Mutex::new(Proxies {
                data_addr,
                admin_addr,
                data_proxy: None,
                admin_proxy: None,
                needs_resolve,
                last_resolved_at: clock.now(),
            }),
        }
    }

    pub fn data_host(&self) -> &HostPort {
        &self.data_host
    }

    pub fn data_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().data_addr
    }

    pub fn needs_resolve(&self) -> bool {
        self.inner.lock().needs_resolve
    }

    pub fn has_proxies(&self) -> bool {
        let inner = self.inner.lock();
        inner.data_proxy.is_some() && inner.admin_proxy.is_some()
    }

    /// Dial both protocol paths if not already connected. Both proxies are
    /// committed together; a half-failed dial leaves the endpoint with
    /// neither.
    pub async fn ensure_proxies(
        &self,
        connector: &dyn Connector,
    ) -> Result<(Arc<dyn DataProtocol>, Arc<dyn AdminProtocol>), RpcError> {
        let (data_addr, admin_addr) = {
            let inner = self.inner.lock();
            if let (Some(data), Some(admin)) = (&inner.data_proxy, &inner.admin_proxy) {
                return Ok((data.clone(), admin.clone()));
            }
            match (inner.data_addr, inner.admin_addr) {
                (Some(d), Some(a)) => (d, a),
                _ => {
                    drop(inner);
                    return Err(self.note(RpcError::UnknownHost(self.data_host.to_string())));
                }
            }
        };
        let data = connector.connect_data(data_addr).await.map_err(|e| self.note(e))?;
        let admin = connector.connect_admin(admin_addr).await.map_err(|e| self.note(e))?;
        let mut inner = self.inner.lock();
        inner.data_proxy = Some(data.clone());
        inner.admin_proxy = Some(admin.clone());
        Ok((data, admin))
    }

    /// Record an RPC failure against this endpoint. Unreachable classes
    /// schedule a re-resolution; everything else passes through untouched.
    pub fn note(&self, err: RpcError) -> RpcError {
        if err.needs_resolve() {
            self.inner.lock().needs_resolve = true;
        }
        err
    }

    /// Whether `maybe_reresolve` would act right now.
    pub fn due_for_resolve(&self, clock: &dyn Clock) -> bool {
        let inner = self.inner.lock();
        inner.needs_resolve
            && clock.now().saturating_duration_since(inner.last_resolved_at)
                >= self.resolve_min_interval
    }

    /// Re-resolve both addresses if a resolution is due. Returns whether
    /// either address actually changed. Must be called only when no
    /// session is active on this endpoint: the caller stops the session
    /// first, so a changed address cannot strand a live proxy.
    pub fn maybe_reresolve(
        &self,
        resolver: &dyn Resolver,
        clock: &dyn Clock,
    ) -> Result<bool, RpcError> {
        {
            let inner = self.inner.lock();
            if !inner.needs_resolve {
                return Ok(false);
            }
            if clock.now().saturating_duration_since(inner.last_resolved_at)
                < self.resolve_min_interval
            {
                return Ok(false);
            }
        }
        let data = resolver.resolve(&self.data_host);
        let admin = resolver.resolve(&self.admin_host);
        let mut inner = self.inner.lock();
        inner.last_resolved_at = clock.now();
        match (data, admin) {
            (Ok(d), Ok(a)) => {
                let changed = inner.data_addr != Some(d) || inner.admin_addr != Some(a);
                if changed {
                    debug!(peer = %self.data_host, addr = %d, "resolved to a new address");
                }
                inner.data_addr = Some(d);
                inner.admin_addr = Some(a);
                inner.needs_resolve = false;
                Ok(changed)
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// Tear down both proxies. Idempotent.
    pub fn close_proxies(&self) {
        let mut inner = self.inner.lock();
        inner.data_proxy = None;
        inner.admin_proxy = None;
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;

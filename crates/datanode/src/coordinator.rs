// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination-service seam.
//!
//! The coordinator publishes which of a namespace's two metadata servers is
//! currently primary. The data node never elects anyone; it only reads the
//! published fact, and only at startup and around session restarts. Each
//! service pair owns a private client obtained from the factory so that
//! stopping one pair shuts down exactly its own client.

use crate::config::{Conf, ConfigError, DFS_COORDINATOR_PRIMARY};
use async_trait::async_trait;
use hafs_core::HostPort;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Current published primary for the namespace registered under
    /// `default_addr`. `None` is legal and means no primary is published
    /// (failover in progress).
    async fn primary_for(
        &self,
        default_addr: &HostPort,
    ) -> Result<Option<HostPort>, CoordinatorError>;

    /// Release client resources. Called once by the owning pair's `stop`.
    fn shutdown(&self) {}
}

pub trait CoordinatorFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Coordinator>;
}

/// Coordinator backed by a fixed published-primary table. Deployments with
/// a consensus-backed registry plug their client in behind
/// `CoordinatorFactory` instead.
#[derive(Debug, Clone, Default)]
pub struct StaticCoordinator {
    primaries: HashMap<HostPort, HostPort>,
}

impl StaticCoordinator {
    pub fn new(primaries: HashMap<HostPort, HostPort>) -> Self {
        StaticCoordinator { primaries }
    }
}

#[async_trait]
impl Coordinator for StaticCoordinator {
    async fn primary_for(
        &self,
        default_addr: &HostPort,
    ) -> Result<Option<HostPort>, CoordinatorError> {
        Ok(self.primaries.get(default_addr).cloned())
    }
}

/// Factory for `StaticCoordinator`, sharing one table across pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticCoordinatorFactory {
    primaries: HashMap<HostPort, HostPort>,
}

impl StaticCoordinatorFactory {
    pub fn new(primaries: HashMap<HostPort, HostPort>) -> Self {
        StaticCoordinatorFactory { primaries }
    }

    /// Build the published-primary table from
    /// `dfs.coordinator.primary.<nameservice>` keys.
    pub fn from_conf(conf: &Conf) -> Result<Self, ConfigError> {
        let mut primaries = HashMap::new();
        for ns in conf.namespace_set()? {
            let key = format!("{DFS_COORDINATOR_PRIMARY}.{}", ns.nameservice_id);
            let Some(value) = conf.get(&key) else { continue };
            let primary: HostPort =
                value.parse().map_err(|e: hafs_core::AddrParseError| ConfigError::BadValue {
                    key: key.clone(),
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
            primaries.insert(ns.default_addr.clone(), primary);
        }
        Ok(StaticCoordinatorFactory { primaries })
    }
}

impl CoordinatorFactory for StaticCoordinatorFactory {
    fn create(&self) -> Arc<dyn Coordinator> {
        Arc::new(StaticCoordinator::new(self.primaries.clone()))
    }
}

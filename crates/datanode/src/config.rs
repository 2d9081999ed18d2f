// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat string-keyed configuration.
//!
//! Keys follow the classic dotted naming of the wider deployment tooling
//! (`dfs.namenode.rpc-address.<ns>0`, …); on disk they live as quoted
//! top-level keys in a TOML file.

use hafs_core::HostPort;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Fallback default metadata address.
pub const FS_DEFAULT_NAME: &str = "fs.default.name";
/// Comma-separated list of nameservice labels this node serves.
pub const DFS_NAMESERVICES: &str = "dfs.nameservices";
/// Per-namespace data-protocol address prefix; suffixed with `0` or `1`
/// for the two peers, unsuffixed for the logical (coordinator) address.
pub const DFS_NAMENODE_RPC_ADDRESS: &str = "dfs.namenode.rpc-address";
/// Admin-protocol port. Default: data port + 1.
pub const DFS_ADMIN_PORT: &str = "dfs.avatarnode.port";
/// Bypass disk recovery and synthesize storage from the handshake.
pub const DFS_SIMULATED_STORAGE: &str = "dfs.datanode.simulateddatastorage";
/// Startup option: REGULAR or ROLLBACK.
pub const DFS_DATANODE_STARTUP: &str = "dfs.datanode.startup";
/// Comma-separated list of local data directories.
pub const DFS_DATA_DIRS: &str = "dfs.data.dir";
/// host:port this node serves block data on; reported in registrations.
pub const DFS_DATANODE_ADDRESS: &str = "dfs.datanode.address";
/// Published-primary table prefix for the static coordinator,
/// suffixed with the nameservice label.
pub const DFS_COORDINATOR_PRIMARY: &str = "dfs.coordinator.primary";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("config file {0} is not valid TOML: {1}")]
    Toml(PathBuf, String),

    #[error("config key '{0}' holds a nested table, expected a scalar")]
    Nested(String),

    #[error("missing required config key '{0}'")]
    MissingKey(String),

    #[error("config key '{key}' holds '{value}': {reason}")]
    BadValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// How the data node comes up with respect to its on-disk state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartupOption {
    #[default]
    Regular,
    Rollback,
}

impl fmt::Display for StartupOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupOption::Regular => f.write_str("REGULAR"),
            StartupOption::Rollback => f.write_str("ROLLBACK"),
        }
    }
}

impl FromStr for StartupOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REGULAR" => Ok(StartupOption::Regular),
            "ROLLBACK" => Ok(StartupOption::Rollback),
            other => Err(format!("unknown startup option '{other}'")),
        }
    }
}

/// One namespace as configured: a stable label, the logical address the
/// coordinator key is registered under, and the two peer endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConf {
    pub nameservice_id: String,
    pub default_addr: HostPort,
    pub data_addrs: [HostPort; 2],
    pub admin_addrs: [HostPort; 2],
}

/// Flat key/value configuration.
#[derive(Debug, Clone, Default)]
pub struct Conf {
    values: HashMap<String, String>,
}

impl Conf {
    pub fn new() -> Self {
        Conf::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Conf {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Load from a TOML file. Scalars become strings; arrays are
    /// comma-joined; nested tables are rejected.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let table: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Toml(path.to_path_buf(), e.to_string()))?;
        let mut values = HashMap::new();
        for (key, value) in table {
            values.insert(key.clone(), flatten_value(&key, value)?);
        }
        Ok(Conf { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    tracing::warn!(key, value = other, "unparsable boolean, using default");
                    default
                }
            },
        }
    }

    fn get_addr(&self, key: &str) -> Result<Option<HostPort>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<HostPort>()
                .map(Some)
                .map_err(|e| ConfigError::BadValue {
                    key: key.to_string(),
                    value: v.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    fn require_addr(&self, key: &str) -> Result<HostPort, ConfigError> {
        self.get_addr(key)?
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Configured local data directories.
    pub fn data_dirs(&self) -> Vec<PathBuf> {
        self.get(DFS_DATA_DIRS)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn startup_option(&self) -> Result<StartupOption, ConfigError> {
        match self.get(DFS_DATANODE_STARTUP) {
            None => Ok(StartupOption::default()),
            Some(v) => v.parse().map_err(|reason| ConfigError::BadValue {
                key: DFS_DATANODE_STARTUP.to_string(),
                value: v.to_string(),
                reason,
            }),
        }
    }

    /// The namespace set this node serves, in configuration order.
    pub fn namespace_set(&self) -> Result<Vec<NamespaceConf>, ConfigError> {
        let services: Vec<String> = self
            .get(DFS_NAMESERVICES)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if services.is_empty() {
            return Ok(vec![self.one_namespace("default", "")?]);
        }
        services
            .iter()
            .map(|ns| self.one_namespace(ns, &format!(".{ns}")))
            .collect()
    }

    fn one_namespace(&self, label: &str, key_infix: &str) -> Result<NamespaceConf, ConfigError> {
        let data0 =
            self.require_addr(&format!("{DFS_NAMENODE_RPC_ADDRESS}{key_infix}0"))?;
        let data1 =
            self.require_addr(&format!("{DFS_NAMENODE_RPC_ADDRESS}{key_infix}1"))?;
        let default_addr = match self
            .get_addr(&format!("{DFS_NAMENODE_RPC_ADDRESS}{key_infix}"))?
        {
            Some(addr) => addr,
            None => self.require_addr(FS_DEFAULT_NAME)?,
        };
        let admin_port = match self.get(DFS_ADMIN_PORT) {
            None => None,
            Some(v) => Some(v.parse::<u16>().map_err(|e| ConfigError::BadValue {
                key: DFS_ADMIN_PORT.to_string(),
                value: v.to_string(),
                reason: e.to_string(),
            })?),
        };
        let admin_for = |data: &HostPort| -> Result<HostPort, ConfigError> {
            match admin_port {
                Some(p) => Ok(data.with_port(p)),
                None => {
                    let p = data.port().checked_add(1).ok_or_else(|| ConfigError::BadValue {
                        key: format!("{DFS_NAMENODE_RPC_ADDRESS}{key_infix}"),
                        value: data.to_string(),
                        reason: "data port has no room for the admin port".to_string(),
                    })?;
                    Ok(data.with_port(p))
                }
            }
        };
        let admin0 = admin_for(&data0)?;
        let admin1 = admin_for(&data1)?;
        Ok(NamespaceConf {
            nameservice_id: label.to_string(),
            default_addr,
            data_addrs: [data0, data1],
            admin_addrs: [admin0, admin1],
        })
    }
}

fn flatten_value(key: &str, value: toml::Value) -> Result<String, ConfigError> {
    Ok(match value {
        toml::Value::String(s) => s,
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(flatten_value(key, item)?);
            }
            parts.join(",")
        }
        toml::Value::Table(_) => return Err(ConfigError::Nested(key.to_string())),
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

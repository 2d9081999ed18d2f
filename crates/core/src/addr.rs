// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configured network addresses.
//!
//! A `HostPort` is the address as written in configuration. It survives DNS
//! churn, which is why the namespace manager keys its pairs by `HostPort`
//! and not by a resolved socket address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("address '{0}' is not of the form host:port")]
    MissingPort(String),

    #[error("address '{0}' has an invalid port")]
    BadPort(String),

    #[error("address '{0}' has an empty host")]
    EmptyHost(String),
}

/// A host:port pair as configured, prior to resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        HostPort { host: host.into(), port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same host, different port. Used to derive the admin-path address
    /// from the data-path address.
    pub fn with_port(&self, port: u16) -> Self {
        HostPort { host: self.host.clone(), port }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostPort {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddrParseError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(AddrParseError::EmptyHost(s.to_string()));
        }
        let port = port.parse::<u16>().map_err(|_| AddrParseError::BadPort(s.to_string()))?;
        Ok(HostPort { host: host.to_string(), port })
    }
}

impl TryFrom<String> for HostPort {
    type Error = AddrParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HostPort> for String {
    fn from(hp: HostPort) -> String {
        hp.to_string()
    }
}

#[cfg(test)]
#[path = "addr_tests.rs"]
mod tests;

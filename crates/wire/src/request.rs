// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::types::{DatanodeRegistration, ErrorSeverity};

/// Request from data node to metadata server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Handshake: ask the namespace who it is
    Version,

    /// Enroll this data node as a member of the namespace
    Register {
        registration: DatanodeRegistration,
        transfer_version: u32,
    },

    /// Report a data-node-side error to the server
    ErrorReport {
        registration: DatanodeRegistration,
        severity: ErrorSeverity,
        message: String,
    },

    /// Admin-path liveness probe
    Ping,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::error::RemoteClass;
use crate::types::{DatanodeRegistration, NamespaceInfo};

/// Response from metadata server to data node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Admin-path liveness reply
    Pong,

    /// Handshake result
    Namespace { info: NamespaceInfo },

    /// Registration accepted; storage id is authoritative
    Registered { registration: DatanodeRegistration },

    /// Tagged server-side failure
    Error { class: RemoteClass, message: String },
}

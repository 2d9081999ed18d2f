// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC surface between a data node and its metadata servers.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod codec;
mod error;
mod protocol;
mod request;
mod response;
mod types;

pub use client::TcpConnector;
pub use codec::{decode, encode, read_message, write_message, ProtocolError, MAX_MESSAGE_BYTES};
pub use error::{RemoteClass, RpcError};
pub use protocol::{AdminProtocol, Connector, DataProtocol, Resolver, SystemResolver};
pub use request::Request;
pub use response::Response;
pub use types::{
    DatanodeRegistration, ErrorSeverity, NamespaceInfo, StorageInfo, TRANSFER_VERSION,
};

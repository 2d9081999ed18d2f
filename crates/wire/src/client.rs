// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP client for both protocol paths.
//!
//! One request in flight per connection. There is no in-client retry or
//! reconnect: a failed call surfaces its class and the owner of the proxy
//! decides whether to redial.

use crate::codec::{decode, encode, read_message, write_message, ProtocolError};
use crate::error::RpcError;
use crate::protocol::{AdminProtocol, Connector, DataProtocol};
use crate::request::Request;
use crate::response::Response;
use crate::types::{DatanodeRegistration, ErrorSeverity, NamespaceInfo};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Dials metadata servers over TCP with bounded connect and call times.
#[derive(Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        TcpConnector { connect_timeout, io_timeout }
    }

    async fn dial(&self, addr: SocketAddr) -> Result<RpcClient, RpcError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::Timeout(addr))?
            .map_err(|e| RpcError::classify_io(e, addr))?;
        if let Err(e) = stream.set_nodelay(true) {
            return Err(RpcError::classify_io(e, addr));
        }
        Ok(RpcClient {
            addr,
            io_timeout: self.io_timeout,
            stream: Mutex::new(stream),
        })
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        TcpConnector::new(Duration::from_secs(20), Duration::from_secs(60))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect_data(&self, addr: SocketAddr) -> Result<Arc<dyn DataProtocol>, RpcError> {
        Ok(Arc::new(DataClient(self.dial(addr).await?)))
    }

    async fn connect_admin(&self, addr: SocketAddr) -> Result<Arc<dyn AdminProtocol>, RpcError> {
        Ok(Arc::new(AdminClient(self.dial(addr).await?)))
    }
}

struct RpcClient {
    addr: SocketAddr,
    io_timeout: Duration,
    stream: Mutex<TcpStream>,
}

impl RpcClient {
    async fn call(&self, request: &Request) -> Result<Response, RpcError> {
        let payload = encode(request).map_err(|e| RpcError::Protocol(e.to_string()))?;
        let mut stream = self.stream.lock().await;
        let exchange = async {
            write_message(&mut *stream, &payload).await?;
            read_message(&mut *stream).await
        };
        let reply = tokio::time::timeout(self.io_timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout(self.addr))?
            .map_err(|e| self.classify(e))?;
        let response: Response =
            decode(&reply).map_err(|e| RpcError::Protocol(e.to_string()))?;
        if let Response::Error { class, message } = response {
            return Err(RpcError::Remote { addr: self.addr, class, message });
        }
        Ok(response)
    }

    fn classify(&self, err: ProtocolError) -> RpcError {
        match err {
            ProtocolError::Io(e) => RpcError::classify_io(e, self.addr),
            other => RpcError::Protocol(other.to_string()),
        }
    }
}

struct DataClient(RpcClient);

#[async_trait]
impl DataProtocol for DataClient {
    async fn version_request(&self) -> Result<NamespaceInfo, RpcError> {
        match self.0.call(&Request::Version).await? {
            Response::Namespace { info } => Ok(info),
            other => Err(RpcError::Protocol(format!("unexpected reply to Version: {other:?}"))),
        }
    }

    async fn register(
        &self,
        registration: DatanodeRegistration,
        transfer_version: u32,
    ) -> Result<DatanodeRegistration, RpcError> {
        let request = Request::Register { registration, transfer_version };
        match self.0.call(&request).await? {
            Response::Registered { registration } => Ok(registration),
            other => Err(RpcError::Protocol(format!("unexpected reply to Register: {other:?}"))),
        }
    }

    async fn error_report(
        &self,
        registration: &DatanodeRegistration,
        severity: ErrorSeverity,
        message: &str,
    ) -> Result<(), RpcError> {
        let request = Request::ErrorReport {
            registration: registration.clone(),
            severity,
            message: message.to_string(),
        };
        match self.0.call(&request).await? {
            Response::Ok => Ok(()),
            other => Err(RpcError::Protocol(format!(
                "unexpected reply to ErrorReport: {other:?}"
            ))),
        }
    }
}

struct AdminClient(RpcClient);

#[async_trait]
impl AdminProtocol for AdminClient {
    async fn ping(&self) -> Result<(), RpcError> {
        match self.0.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(RpcError::Protocol(format!("unexpected reply to Ping: {other:?}"))),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

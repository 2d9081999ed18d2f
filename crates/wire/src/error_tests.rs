// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::net::SocketAddr;
use yare::parameterized;

fn addr() -> SocketAddr {
    "10.0.0.1:8020".parse().unwrap()
}

#[parameterized(
    refused = { RpcError::ConnectRefused("10.0.0.1:8020".parse().unwrap()), true },
    no_route = { RpcError::NoRoute("10.0.0.1:8020".parse().unwrap()), true },
    port_unreachable = { RpcError::PortUnreachable("10.0.0.1:8020".parse().unwrap()), true },
    unknown_host = { RpcError::UnknownHost("nn0:8020".into()), true },
    timeout = { RpcError::Timeout("10.0.0.1:8020".parse().unwrap()), false },
    protocol = { RpcError::Protocol("garbage".into()), false },
)]
fn needs_resolve_covers_exactly_the_unreachable_classes(err: RpcError, expected: bool) {
    assert_eq!(err.needs_resolve(), expected);
}

#[test]
fn timeout_is_not_a_resolve_trigger() {
    let err = RpcError::Timeout(addr());
    assert!(err.is_timeout());
    assert!(!err.needs_resolve());
}

#[parameterized(
    unregistered = { RemoteClass::UnregisteredDatanode, true },
    disallowed = { RemoteClass::DisallowedDatanode, true },
    incorrect_version = { RemoteClass::IncorrectVersion, true },
    other = { RemoteClass::Other, false },
)]
fn fatal_remote_classes(class: RemoteClass, fatal: bool) {
    assert_eq!(class.is_fatal(), fatal);
    let err = RpcError::Remote { addr: addr(), class, message: "m".into() };
    assert_eq!(err.remote_class(), Some(class));
}

#[parameterized(
    refused = { std::io::ErrorKind::ConnectionRefused },
    timed_out = { std::io::ErrorKind::TimedOut },
)]
fn classify_io_maps_known_kinds(kind: std::io::ErrorKind) {
    let err = RpcError::classify_io(std::io::Error::from(kind), addr());
    match kind {
        std::io::ErrorKind::ConnectionRefused => {
            assert!(matches!(err, RpcError::ConnectRefused(_)))
        }
        std::io::ErrorKind::TimedOut => assert!(matches!(err, RpcError::Timeout(_))),
        _ => unreachable!(),
    }
}

#[test]
fn classify_io_leaves_unknown_kinds_as_io() {
    let err = RpcError::classify_io(std::io::Error::other("disk on fire"), addr());
    assert!(matches!(err, RpcError::Io(_)));
    assert!(!err.needs_resolve());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_host_and_port() {
    let hp: HostPort = "nn0.example.com:8020".parse().unwrap();
    assert_eq!(hp.host(), "nn0.example.com");
    assert_eq!(hp.port(), 8020);
    assert_eq!(hp.to_string(), "nn0.example.com:8020");
}

#[test]
fn rejects_missing_port() {
    let err = "nn0.example.com".parse::<HostPort>().unwrap_err();
    assert!(matches!(err, AddrParseError::MissingPort(_)));
}

#[test]
fn rejects_bad_port() {
    let err = "nn0:eighty".parse::<HostPort>().unwrap_err();
    assert!(matches!(err, AddrParseError::BadPort(_)));
    let err = "nn0:99999".parse::<HostPort>().unwrap_err();
    assert!(matches!(err, AddrParseError::BadPort(_)));
}

#[test]
fn rejects_empty_host() {
    let err = ":8020".parse::<HostPort>().unwrap_err();
    assert!(matches!(err, AddrParseError::EmptyHost(_)));
}

#[test]
fn with_port_keeps_host() {
    let hp = HostPort::new("10.0.0.1", 8020);
    let admin = hp.with_port(8021);
    assert_eq!(admin.host(), "10.0.0.1");
    assert_eq!(admin.port(), 8021);
}

#[test]
fn serde_roundtrip_as_string() {
    let hp = HostPort::new("nn1", 9000);
    let json = serde_json::to_string(&hp).unwrap();
    assert_eq!(json, "\"nn1:9000\"");
    let back: HostPort = serde_json::from_str(&json).unwrap();
    assert_eq!(back, hp);
}

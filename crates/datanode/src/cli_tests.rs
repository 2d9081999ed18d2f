// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn no_arguments_means_regular_startup() {
    let parsed = parse_args(args(&[])).unwrap();
    assert_eq!(parsed.startup, StartupOption::Regular);
    assert_eq!(parsed.conf_path, None);
}

#[parameterized(
    single_dash = { "-rollback" },
    double_dash = { "--rollback" },
)]
fn rollback_flag_is_recognised(flag: &str) {
    let parsed = parse_args(args(&[flag])).unwrap();
    assert_eq!(parsed.startup, StartupOption::Rollback);
}

#[test]
fn regular_after_rollback_wins() {
    let parsed = parse_args(args(&["-rollback", "-regular"])).unwrap();
    assert_eq!(parsed.startup, StartupOption::Regular);
}

#[test]
fn conf_takes_the_following_path() {
    let parsed = parse_args(args(&["-conf", "/etc/hafs/site.toml"])).unwrap();
    assert_eq!(parsed.conf_path, Some(PathBuf::from("/etc/hafs/site.toml")));
}

#[test]
fn conf_without_a_path_is_an_error() {
    let err = parse_args(args(&["-conf"])).unwrap_err();
    assert_eq!(err, CliError::MissingConfPath);
}

#[parameterized(
    short = { "-r" },
    long = { "--rack" },
)]
fn rack_flags_are_rejected_with_a_pointed_error(flag: &str) {
    let err = parse_args(args(&[flag])).unwrap_err();
    assert!(matches!(err, CliError::RackUnsupported(_)), "got {err:?}");
}

#[test]
fn unknown_arguments_are_rejected() {
    let err = parse_args(args(&["-upgrade"])).unwrap_err();
    assert!(matches!(err, CliError::Unknown(_)), "got {err:?}");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface of the `hafsdn` daemon.
//!
//! The flags keep the single-dash spelling of the wider deployment
//! tooling (`-rollback`, `-regular`), with the double-dash forms accepted
//! as aliases. Rack placement is configured on the metadata servers, so
//! `-r`/`--rack` is rejected with a pointed message instead of being
//! silently unknown.

use crate::config::StartupOption;
use std::path::PathBuf;
use thiserror::Error;

pub const USAGE: &str = "usage: hafsdn [-regular | -rollback] [-conf <file>]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("rack configuration is handled by the metadata servers; remove '{0}'")]
    RackUnsupported(String),

    #[error("unrecognized argument '{0}'")]
    Unknown(String),

    #[error("'-conf' requires a file path")]
    MissingConfPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliArgs {
    pub startup: StartupOption,
    pub conf_path: Option<PathBuf>,
}

pub fn parse_args<I>(args: I) -> Result<CliArgs, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-rollback" | "--rollback" => parsed.startup = StartupOption::Rollback,
            "-regular" | "--regular" => parsed.startup = StartupOption::Regular,
            "-conf" | "--conf" => {
                let path = args.next().ok_or(CliError::MissingConfPath)?;
                parsed.conf_path = Some(PathBuf::from(path));
            }
            "-r" | "--rack" => return Err(CliError::RackUnsupported(arg)),
            other => return Err(CliError::Unknown(other.to_string())),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

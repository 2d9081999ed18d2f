// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `hafsdn`: the HAFS data node daemon.

use hafs_datanode::cli::{parse_args, CliArgs, USAGE};
use hafs_datanode::config::{
    Conf, DFS_DATANODE_ADDRESS, DFS_DATANODE_STARTUP, DFS_SIMULATED_STORAGE,
};
use hafs_datanode::coordinator::StaticCoordinatorFactory;
use hafs_datanode::error::NodeError;
use hafs_datanode::node::{DataNode, NodeDeps, ShutdownHandle, Tunables};
use hafs_datanode::offer::HeartbeatOfferFactory;
use hafs_datanode::storage::{
    check_data_dirs, BlockStore, DiskStorage, FsBlockStore, MemBlockStore, SimulatedStorage,
    Storage,
};
use hafs_core::SystemClock;
use hafs_wire::{SystemResolver, TcpConnector};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONF: &str = "hafs-site.toml";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };
    // Keep the appender guard alive for the process lifetime.
    let _log_guard = init_tracing();
    run(cli)
}

/// When HAFSDN_LOG_DIR is set, logs additionally roll daily into that
/// directory.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Ok(dir) = std::env::var("HAFSDN_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "hafsdn.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

#[tokio::main]
async fn run(cli: CliArgs) -> ExitCode {
    let conf_path = cli.conf_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONF));
    let mut conf = match Conf::load(&conf_path) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    conf.set(DFS_DATANODE_STARTUP, cli.startup.to_string());

    let node = match bootstrap(&conf) {
        Ok(node) => node,
        Err(e) => {
            error!(error = %e, "data node startup failed");
            return ExitCode::FAILURE;
        }
    };
    node.start();

    tokio::spawn(signal_loop(node.clone(), conf_path));

    if node.run().await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn bootstrap(conf: &Conf) -> Result<Arc<DataNode>, NodeError> {
    let simulated = conf.get_bool(DFS_SIMULATED_STORAGE, false);
    let (storage, block_store): (Arc<dyn Storage>, Arc<dyn BlockStore>) = if simulated {
        info!("running with simulated storage");
        (
            Arc::new(SimulatedStorage::new()),
            Arc::new(MemBlockStore::default()),
        )
    } else {
        let dirs = check_data_dirs(&conf.data_dirs())?;
        info!(dirs = dirs.len(), "validated data directories");
        (
            Arc::new(DiskStorage::open(dirs)?),
            Arc::new(FsBlockStore::default()),
        )
    };

    let deps = Arc::new(NodeDeps {
        local_name: conf
            .get(DFS_DATANODE_ADDRESS)
            .unwrap_or("0.0.0.0:50010")
            .to_string(),
        clock: Arc::new(SystemClock),
        storage,
        block_store,
        scanner: None,
        connector: Arc::new(TcpConnector::default()),
        resolver: Arc::new(SystemResolver),
        coordinators: Arc::new(StaticCoordinatorFactory::from_conf(conf)?),
        offers: Arc::new(HeartbeatOfferFactory),
        startup: conf.startup_option()?,
        tunables: Tunables::default(),
        storage_gate: Mutex::new(()),
        shutdown: ShutdownHandle::new(),
    });
    DataNode::new(conf, deps)
}

/// SIGTERM/SIGINT shut the node down; SIGHUP re-reads the configuration
/// and refreshes the namespace set.
async fn signal_loop(node: Arc<DataNode>, conf_path: PathBuf) {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            return;
        }
    };
    let mut int = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGINT handler");
            return;
        }
    };
    let mut hup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = term.recv() => {
                info!("SIGTERM received");
                node.request_shutdown();
                return;
            }
            _ = int.recv() => {
                info!("SIGINT received");
                node.request_shutdown();
                return;
            }
            _ = hup.recv() => {
                info!("SIGHUP received, refreshing namespace set");
                refresh_from_disk(&node, &conf_path).await;
            }
        }
    }
}

async fn refresh_from_disk(node: &DataNode, conf_path: &Path) {
    let conf = match Conf::load(conf_path) {
        Ok(conf) => conf,
        Err(e) => {
            warn!(error = %e, "ignoring refresh: cannot re-read configuration");
            return;
        }
    };
    let new_set = match conf.namespace_set() {
        Ok(set) => set,
        Err(e) => {
            warn!(error = %e, "ignoring refresh: bad namespace configuration");
            return;
        }
    };
    if let Err(e) = node.refresh(&new_set).await {
        warn!(error = %e, "namespace refresh failed");
    }
}

//! End-to-end scenarios for the data node's namespace service manager,
//! driven through the public API against in-memory collaborators.

mod prelude {
    pub use hafs_core::{Block, NamespaceId, StorageId, LAYOUT_VERSION};
    pub use hafs_datanode::config::Conf;
    pub use hafs_datanode::storage::Storage;
    pub use hafs_datanode::test_support::*;
    pub use hafs_datanode::{DataNode, NodeError};
    pub use std::time::Duration;

    pub const WAIT: Duration = Duration::from_secs(5);

    /// One-namespace configuration matching `ns_conf("alpha", ...)`.
    pub fn alpha_conf() -> Conf {
        Conf::from_pairs([
            ("dfs.nameservices", "alpha"),
            ("dfs.namenode.rpc-address.alpha0", "10.0.0.1:8020"),
            ("dfs.namenode.rpc-address.alpha1", "10.0.0.2:8020"),
            ("fs.default.name", "alpha.logical:8020"),
        ])
    }
}

mod failover;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{default_info, harness, ns_conf, wait_for};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn add_rejects_duplicate_keys() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");

    manager.add(&conf).expect("first add");
    let err = manager.add(&conf).err().expect("duplicate must fail");
    assert!(matches!(err, NodeError::DuplicateNamespace(_)), "got {err:?}");
    assert_eq!(manager.len(), 1);
}

#[tokio::test]
async fn notifications_to_missing_namespaces_surface_unknown_namespace() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());

    let err = manager
        .notify_received(NamespaceId(9), Block::new(1, 64, 1), None)
        .expect_err("must fail");
    assert!(matches!(err, NodeError::UnknownNamespace(_)), "got {err:?}");

    let err = manager
        .notify_deleted(NamespaceId(9), Block::new(1, 64, 1))
        .expect_err("must fail");
    assert!(matches!(err, NodeError::UnknownNamespace(_)), "got {err:?}");
}

#[tokio::test]
async fn notifications_route_by_namespace_id() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let alpha = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let beta = ns_conf("beta", "10.0.1.1:8020", "10.0.1.2:8020");
    h.wire_namespace(&alpha, default_info(41));
    h.wire_namespace(&beta, default_info(42));

    manager.add(&alpha).expect("add alpha");
    manager.add(&beta).expect("add beta");
    manager.start_all();

    wait_for("both namespaces initialized", WAIT, || {
        manager.get(NamespaceId(41)).is_some() && manager.get(NamespaceId(42)).is_some()
    })
    .await;
    wait_for("beta serving", WAIT, || {
        let pair = manager.get(NamespaceId(42)).expect("beta");
        pair.session(0).is_serving() && pair.session(1).is_serving()
    })
    .await;

    manager
        .notify_received(NamespaceId(42), Block::new(7, 64, 1), None)
        .expect("deliver");

    // Only beta's offers see the event.
    for role in 0..2 {
        let beta_offer = h.offers.latest("beta", role).expect("beta offer");
        assert_eq!(beta_offer.events().len(), 1);
        if let Some(alpha_offer) = h.offers.latest("alpha", role) {
            assert!(alpha_offer.events().is_empty());
        }
    }

    manager.stop_all();
    manager.join_all().await;
}

#[tokio::test]
async fn refresh_diffs_by_session_zero_address() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let alpha = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let beta = ns_conf("beta", "10.0.1.1:8020", "10.0.1.2:8020");
    let gamma = ns_conf("gamma", "10.0.2.1:8020", "10.0.2.2:8020");
    h.wire_namespace(&alpha, default_info(41));
    h.wire_namespace(&beta, default_info(42));
    h.wire_namespace(&gamma, default_info(43));

    let alpha_pair = manager.add(&alpha).expect("add alpha");
    let beta_pair = manager.add(&beta).expect("add beta");
    manager.start_all();
    wait_for("alpha initialized", WAIT, || alpha_pair.is_initialized()).await;

    manager
        .refresh(&[beta.clone(), gamma.clone()])
        .await
        .expect("refresh");

    // Keys now follow the new set exactly.
    let keys = manager.keys();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&beta.data_addrs[0]));
    assert!(keys.contains(&gamma.data_addrs[0]));

    // Surviving pairs are the same objects: no restart.
    let beta_after = manager
        .pairs()
        .into_iter()
        .find(|p| p.key() == &beta.data_addrs[0])
        .expect("beta pair");
    assert!(Arc::ptr_eq(&beta_pair, &beta_after));

    // The removed pair is fully stopped and joined.
    assert!(!alpha_pair.session(0).is_serving());
    assert!(!alpha_pair.session(1).is_serving());
    assert_eq!(h.block_store.remove_count(NamespaceId(41)), 1);

    // The added pair starts.
    let gamma_pair = manager
        .pairs()
        .into_iter()
        .find(|p| p.key() == &gamma.data_addrs[0])
        .expect("gamma pair");
    wait_for("gamma initialized", WAIT, || gamma_pair.is_initialized()).await;
    assert_eq!(h.block_store.add_count(NamespaceId(43)), 1);

    manager.stop_all();
    manager.join_all().await;
}

#[tokio::test]
async fn refresh_with_identical_set_changes_nothing() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let alpha = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    h.wire_namespace(&alpha, default_info(41));

    let pair = manager.add(&alpha).expect("add");
    manager.start_all();
    wait_for("alpha initialized", WAIT, || pair.is_initialized()).await;

    manager.refresh(&[alpha.clone()]).await.expect("refresh");

    let after = manager
        .pairs()
        .into_iter()
        .find(|p| p.key() == &alpha.data_addrs[0])
        .expect("alpha pair");
    assert!(Arc::ptr_eq(&pair, &after), "an unchanged pair must not be replaced");
    assert!(pair.session(0).is_serving(), "an unchanged pair must not be restarted");
    assert_eq!(h.block_store.remove_count(NamespaceId(41)), 0);

    manager.stop_all();
    manager.join_all().await;
}

#[tokio::test]
async fn remove_by_namespace_id_is_idempotent() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let alpha = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    h.wire_namespace(&alpha, default_info(41));

    let pair = manager.add(&alpha).expect("add");
    manager.start_all();
    wait_for("alpha initialized", WAIT, || pair.is_initialized()).await;

    let removed = manager.remove(NamespaceId(41)).expect("first removal");
    assert!(Arc::ptr_eq(&removed, &pair));
    assert!(manager.remove(NamespaceId(41)).is_none(), "second removal is a no-op");
    assert!(manager.is_empty());

    removed.stop();
    removed.join().await;
}

#[tokio::test]
async fn cleanup_removes_the_pair_from_the_manager() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let alpha = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    h.wire_namespace(&alpha, default_info(41));

    let pair = manager.add(&alpha).expect("add");
    manager.start_all();
    wait_for("alpha initialized", WAIT, || pair.is_initialized()).await;

    pair.stop();
    pair.join().await;
    // The supervisor's terminal path has already cleaned up and removed
    // the pair from its manager.
    wait_for("manager empty", WAIT, || manager.is_empty()).await;
}

#[tokio::test]
async fn stop_all_then_join_all_leaves_no_worker_running() {
    let h = harness();
    let manager = NamespaceManager::new(h.deps.clone());
    let alpha = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let beta = ns_conf("beta", "10.0.1.1:8020", "10.0.1.2:8020");
    h.wire_namespace(&alpha, default_info(41));
    h.wire_namespace(&beta, default_info(42));

    manager.add(&alpha).expect("add alpha");
    manager.add(&beta).expect("add beta");
    manager.start_all();

    let pairs = manager.pairs();
    wait_for("all initialized", WAIT, || pairs.iter().all(|p| p.is_initialized())).await;

    manager.stop_all();
    manager.join_all().await;
    for pair in &pairs {
        assert!(!pair.session(0).is_serving());
        assert!(!pair.session(1).is_serving());
    }
}

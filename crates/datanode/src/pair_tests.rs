// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::storage::Storage;
use crate::test_support::{
    default_info, harness, harness_with, ns_conf, wait_for, DialFailure, TestCoordinatorFactory,
};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn cold_start_with_primary_on_session_zero() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[0].clone());
    let h = harness_with(coordinators);
    let (node0, node1) = h.wire_namespace(&conf, default_info(42));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();

    wait_for("both sessions serving", WAIT, || {
        pair.session(0).is_serving() && pair.session(1).is_serving()
    })
    .await;

    assert_eq!(pair.namespace_id(), NamespaceId(42));
    assert_eq!(pair.primary_role(), Some(0));
    assert!(pair.is_initialized());
    assert!(h.storage.has_namespace(NamespaceId(42)));
    // The handshake policy goes through the published primary only.
    assert!(node0.handshake_count() >= 1);
    assert_eq!(node1.handshake_count(), 0);

    pair.stop();
    pair.join().await;
}

#[tokio::test]
async fn cold_start_without_primary_handshakes_both() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let h = harness();
    let (node0, node1) = h.wire_namespace(&conf, default_info(42));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();

    wait_for("both sessions serving", WAIT, || {
        pair.session(0).is_serving() && pair.session(1).is_serving()
    })
    .await;

    assert_eq!(pair.primary_role(), None);
    assert!(node0.handshake_count() >= 1);
    assert!(node1.handshake_count() >= 1);
    assert!(pair.is_initialized());

    // No primary declared: sync_block has nowhere to go.
    let handled = pair
        .sync_block(Block::new(1, 64, 1), &[])
        .await
        .expect("sync");
    assert!(!handled);

    pair.stop();
    pair.join().await;
}

#[tokio::test]
async fn handshake_retries_through_transient_failures() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[0].clone());
    coordinators.fail_lookups(2);
    let h = harness_with(coordinators);
    let (node0, _node1) = h.wire_namespace(&conf, default_info(42));
    node0.fail_next_handshake(hafs_wire::RpcError::Timeout(h.data_addr(&conf, 0)));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();

    wait_for("session 0 serving", WAIT, || pair.session(0).is_serving()).await;
    assert!(node0.handshake_count() >= 2, "the timed-out handshake must be retried");

    pair.stop();
    pair.join().await;
}

#[tokio::test]
async fn peer_layout_mismatch_without_primary_is_fatal() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let h = harness();
    let (node0, node1) = h.wire_namespace(&conf, default_info(42));
    let mut skewed = default_info(42);
    skewed.layout_version = LAYOUT_VERSION - 1;
    node1.set_info(skewed);

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();

    wait_for("data-node-wide shutdown", WAIT, || h.deps.shutdown.is_requested()).await;
    assert!(h.deps.shutdown.is_fatal());
    pair.join().await;

    let reported = node0.error_reports().len() + node1.error_reports().len();
    assert!(reported >= 1, "the mismatch must be reported to at least one peer");
    assert!(!pair.is_initialized());
}

#[tokio::test]
async fn remote_layout_differing_from_local_is_fatal() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[0].clone());
    let h = harness_with(coordinators);
    let (_node0, _node1) = h.wire_namespace(&conf, default_info(42));
    let mut foreign = default_info(42);
    foreign.layout_version = LAYOUT_VERSION - 3;
    _node0.set_info(foreign);

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();

    wait_for("data-node-wide shutdown", WAIT, || h.deps.shutdown.is_requested()).await;
    assert!(h.deps.shutdown.is_fatal());
    pair.join().await;
}

#[tokio::test]
async fn one_unreachable_peer_does_not_hold_back_the_other() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[0].clone());
    let h = harness_with(coordinators);
    let (_node0, _node1) = h.wire_namespace(&conf, default_info(42));

    // Session 1's peer is unreachable for a while.
    let addr1 = h.data_addr(&conf, 1);
    h.connector.fail_dials(addr1, DialFailure::UnknownHost, 1000);

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();

    wait_for("session 0 serving", WAIT, || pair.session(0).is_serving()).await;
    assert!(!pair.session(1).is_serving());
    assert!(pair.session(1).endpoint().needs_resolve());
    assert!(pair.is_initialized(), "one registered session initializes the pair");

    // DNS heals; once the floor elapses the next pass re-resolves and
    // session 1 comes up. Session 0 stays serving throughout.
    h.connector.clear_dial_failures(addr1);
    h.clock.advance(Duration::from_secs(121));

    wait_for("session 1 serving", WAIT, || pair.session(1).is_serving()).await;
    assert!(pair.session(0).is_serving());

    pair.stop();
    pair.join().await;
}

#[tokio::test]
async fn block_events_fan_out_to_both_serving_sessions() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let h = harness();
    let _nodes = h.wire_namespace(&conf, default_info(42));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();
    wait_for("both sessions serving", WAIT, || {
        pair.session(0).is_serving() && pair.session(1).is_serving()
    })
    .await;

    let block = Block::new(77, 1 << 20, 4);
    pair.notify_received(block, Some("10.0.0.5:50010".to_string()));
    pair.notify_deleted(Block::new(78, 64, 1));
    pair.report_bad_blocks(&[Block::new(79, 64, 1)]);
    pair.schedule_block_report(Duration::from_secs(60));

    for role in 0..2 {
        let offer = h.offers.latest("alpha", role).expect("offer spawned");
        let events = offer.events();
        assert_eq!(events.len(), 2, "exactly one delivery of each event per session");
        assert_eq!(offer.bad_blocks(), vec![Block::new(79, 64, 1)]);
        assert_eq!(offer.report_delays(), vec![Duration::from_secs(60)]);
    }

    pair.stop();
    pair.join().await;
}

#[tokio::test]
async fn sync_block_reaches_only_the_primary() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[1].clone());
    let h = harness_with(coordinators);
    let _nodes = h.wire_namespace(&conf, default_info(42));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();
    wait_for("both sessions serving", WAIT, || {
        pair.session(0).is_serving() && pair.session(1).is_serving()
    })
    .await;
    assert_eq!(pair.primary_role(), Some(1));

    let handled = pair
        .sync_block(Block::new(5, 64, 1), &[])
        .await
        .expect("sync");
    assert!(handled);

    let standby = h.offers.latest("alpha", 0).expect("offer");
    let primary = h.offers.latest("alpha", 1).expect("offer");
    assert!(standby.syncs().is_empty());
    assert_eq!(primary.syncs(), vec![Block::new(5, 64, 1)]);

    // Failover in progress: nil primary refuses syncs.
    pair.set_primary(None);
    let handled = pair.sync_block(Block::new(6, 64, 1), &[]).await.expect("sync");
    assert!(!handled);

    pair.stop();
    pair.join().await;
}

#[tokio::test]
async fn stop_join_clean_up_are_idempotent() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let h = harness();
    let _nodes = h.wire_namespace(&conf, default_info(42));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();
    wait_for("pair initialized", WAIT, || pair.is_initialized()).await;

    pair.stop();
    pair.stop();
    pair.join().await;
    pair.join().await;
    pair.clean_up();
    pair.clean_up();

    assert!(!pair.session(0).is_serving());
    assert!(!pair.session(1).is_serving());
    // The supervisor's terminal path plus the explicit calls still clean
    // up exactly once.
    assert_eq!(h.block_store.remove_count(NamespaceId(42)), 1);
    assert_eq!(h.scanner.remove_count(NamespaceId(42)), 1);
    assert!(h.coordinators.shutdown_count() >= 1);
}

#[tokio::test]
async fn upgrade_manager_is_armed_once_registered() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let h = harness();
    let _nodes = h.wire_namespace(&conf, default_info(42));

    let pair = ServicePair::new(&conf, h.deps.clone());
    pair.start();
    wait_for("pair initialized", WAIT, || pair.is_initialized()).await;
    assert!(pair.upgrade_manager().is_started());

    pair.stop();
    pair.join().await;
}

//! Partial failure and failover: transient DNS outages on one peer and
//! authoritative primary changes from the offer layer.

use crate::prelude::*;

#[tokio::test]
async fn transient_dns_failure_on_one_peer_heals_after_the_floor() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[0].clone());
    let h = harness_with(coordinators);
    let _nodes = h.wire_namespace(&conf, default_info(42));

    // Every dial to peer 1 fails name resolution for now.
    let addr1 = h.data_addr(&conf, 1);
    h.connector.fail_dials(addr1, DialFailure::UnknownHost, 1000);

    let node = DataNode::new(&alpha_conf(), h.deps.clone()).expect("build node");
    node.start();
    let pair = node.manager().pairs().pop().expect("one pair");

    wait_for("session 0 serving", WAIT, || pair.session(0).is_serving()).await;
    assert!(!pair.session(1).is_serving());
    assert!(pair.session(1).endpoint().needs_resolve());

    // DNS heals. Only after the 120 s floor does the supervisor
    // re-resolve; the address is unchanged and session 1 comes up.
    h.connector.clear_dial_failures(addr1);
    h.clock.advance(Duration::from_secs(121));

    wait_for("session 1 serving", WAIT, || pair.session(1).is_serving()).await;
    // Session 0 was never disturbed.
    assert!(pair.session(0).is_serving());
    assert!(pair.session(0).is_registered());

    node.request_shutdown();
    node.run().await;
}

#[tokio::test]
async fn offer_layer_primary_signals_redirect_sync_traffic() {
    let conf = ns_conf("alpha", "10.0.0.1:8020", "10.0.0.2:8020");
    let coordinators = TestCoordinatorFactory::publishing(conf.data_addrs[0].clone());
    let h = harness_with(coordinators);
    let _nodes = h.wire_namespace(&conf, default_info(42));

    let node = DataNode::new(&alpha_conf(), h.deps.clone()).expect("build node");
    node.start();
    let pair = node.manager().pairs().pop().expect("one pair");
    wait_for("both sessions serving", WAIT, || {
        pair.session(0).is_serving() && pair.session(1).is_serving()
    })
    .await;
    assert_eq!(pair.primary_role(), Some(0));

    // Failover begins: the offer layer observes the primary withdraw.
    pair.set_primary(None);
    let handled = pair.sync_block(Block::new(2, 64, 1), &[]).await.expect("sync");
    assert!(!handled, "no commands may act while no primary is declared");

    // The standby is promoted.
    pair.set_primary(Some(1));
    let handled = pair.sync_block(Block::new(3, 64, 1), &[]).await.expect("sync");
    assert!(handled);
    let promoted = h.offers.latest("alpha", 1).expect("offer");
    assert_eq!(promoted.syncs(), vec![Block::new(3, 64, 1)]);
    let demoted = h.offers.latest("alpha", 0).expect("offer");
    assert!(demoted.syncs().is_empty());

    // Notifications kept flowing to both all along.
    pair.notify_received(Block::new(4, 64, 1), None);
    assert_eq!(demoted.events().len(), 1);
    assert_eq!(promoted.events().len(), 1);

    node.request_shutdown();
    node.run().await;
}

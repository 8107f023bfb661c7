use crate::core::testutil::fixtures::{
    identity_at, join_all_with_timeout, mock_node, mock_ring, stabilize_rounds, true_successor,
};
use crate::core::{Identifier, Identity, Ring};
use crate::error::ChordError;
use crate::network::mock::NetworkHub;
use crate::node::{ChordNode, Node};
use std::sync::Arc;
use std::time::Duration;

const TEN_IDS: [u64; 10] = [3, 12, 27, 33, 48, 51, 66, 79, 84, 97];

fn converged_ring(hub: &Arc<NetworkHub>, ring: Ring, ids: &[u64]) -> Vec<ChordNode> {
    let nodes = mock_ring(hub, ring, ids, 1);
    stabilize_rounds(&nodes, ids.len());
    nodes
}

/// First key of the form `key-<n>` that hashes to the given position.
fn key_hashing_to(ring: &Ring, target: u64) -> String {
    (0..)
        .map(|i| format!("key-{}", i))
        .find(|key| ring.hash_to_identifier(key).value() == target)
        .unwrap()
}

/// On a ring {10, 40, 70} of 100 positions, a lookup for 55 started at node 10 is forwarded once,
/// to node 40, which answers 70.
#[test]
fn test_lookup_routes_through_closest_preceding_finger() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let nodes = converged_ring(&hub, ring, &[10, 40, 70]);

    let fingers: Vec<u64> = nodes[0]
        .fingers()
        .iter()
        .map(|(_, finger)| finger.id().value())
        .collect();
    assert_eq!(fingers, vec![40, 40, 40, 40, 40, 70, 10]);
    assert_eq!(nodes[0].closest_preceding_node(Identifier::new(55)), identity_at(40));

    let key = key_hashing_to(&ring, 55);
    hub.reset_deliveries().unwrap();
    assert_eq!(
        nodes[0].find_successor(ring.hash_to_identifier(&key)),
        Ok(identity_at(70))
    );
    assert_eq!(hub.deliveries(&identity_at(40).address(), "resolve_successor"), 1);
    assert_eq!(hub.deliveries(&identity_at(70).address(), "resolve_successor"), 0);

    nodes[0].insert(&key, "fifty-five").unwrap();
    let stored = nodes[2].describe().entries;
    assert_eq!(
        stored,
        vec![(Identifier::new(55), key.clone(), "fifty-five".to_string())]
    );
    assert!(nodes[0].describe().entries.is_empty());
    assert!(nodes[1].describe().entries.is_empty());
}

#[test]
fn test_lookup_of_own_and_successor_ids() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let nodes = converged_ring(&hub, ring, &[10, 40, 70]);

    assert_eq!(nodes[0].find_successor(Identifier::new(10)), Ok(identity_at(10)));
    assert_eq!(nodes[0].find_successor(Identifier::new(40)), Ok(identity_at(40)));
    assert_eq!(nodes[0].find_successor(Identifier::new(11)), Ok(identity_at(40)));
    assert_eq!(nodes[0].find_successor(Identifier::new(71)), Ok(identity_at(10)));
    assert_eq!(nodes[1].find_successor(Identifier::new(0)), Ok(identity_at(10)));
}

/// Every node resolves every position of the ring to the same, correct owner.
#[test]
fn test_lookup_agreement() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let nodes = converged_ring(&hub, ring, &TEN_IDS);

    for target in 0..100 {
        let expected = identity_at(true_successor(&TEN_IDS, target));
        for node in &nodes {
            assert_eq!(
                node.find_successor(Identifier::new(target)),
                Ok(expected),
                "lookup of {} from {}",
                target,
                node.identity()
            );
        }
    }
}

#[test]
fn test_concurrent_lookups() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let nodes = Arc::new(converged_ring(&hub, ring, &TEN_IDS));

    let handles: Vec<_> = (0..nodes.len())
        .map(|i| {
            let nodes = Arc::clone(&nodes);
            std::thread::spawn(move || {
                for target in 0..100 {
                    let expected = identity_at(true_successor(&TEN_IDS, target));
                    assert_eq!(nodes[i].find_successor(Identifier::new(target)), Ok(expected));
                }
            })
        })
        .collect();

    join_all_with_timeout(handles.into_boxed_slice(), Duration::from_secs(10))
        .expect("concurrent lookups should finish");
}

/// A next hop that does not answer is evicted and the lookup continues with the next candidate.
#[test]
fn test_lookup_evicts_unreachable_next_hop() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let nodes = converged_ring(&hub, ring, &[10, 40, 70]);

    hub.disconnect(&identity_at(40).address()).unwrap();
    assert_eq!(nodes[0].find_successor(Identifier::new(55)), Ok(identity_at(70)));
    assert_eq!(nodes[0].successor_list(), vec![identity_at(70)]);
    assert!(nodes[0]
        .fingers()
        .iter()
        .all(|(_, finger)| *finger != identity_at(40)));
}

/// Losing the only successor in the middle of a lookup leaves the node on its own, which is
/// reported instead of answering with itself.
#[test]
fn test_lookup_that_loses_every_successor_reports_isolation() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let a = mock_node(&hub, ring, 10);
    let b = mock_node(&hub, ring, 40);

    a.successors.reset_to(b.identity());
    a.fingers.update_entry(b.identity(), 0).unwrap();
    hub.disconnect(&b.address()).unwrap();

    assert_eq!(
        a.find_successor(Identifier::new(55)),
        Err(ChordError::RingIsolated(a.address()))
    );
    assert_eq!(a.successor_list(), vec![a.identity(); 3]);
    assert!(a.fingers().is_empty());

    // the seeded node answers on its own from now on
    assert_eq!(a.find_successor(Identifier::new(55)), Ok(a.identity()));
}

/// Routing state that forms a loop trips the hop bound instead of forwarding forever.
#[test]
fn test_hop_bound_stops_routing_loop() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let a = mock_node(&hub, ring, 10);
    let b = mock_node(&hub, ring, 40);

    // a forwards lookups of 5 to b, and b forwards them to a disguised as position 90
    a.successors.reset_to(b.identity());
    a.fingers.update_entry(b.identity(), 0).unwrap();
    b.successors.reset_to(identity_at(70));
    b.fingers
        .update_entry(Identity::new(Identifier::new(90), a.address()), 6)
        .unwrap();

    let max_hops = a.options().max_hops;
    assert_eq!(max_hops, 14);
    assert_eq!(
        a.find_successor(Identifier::new(5)),
        Err(ChordError::LookupExceededHops {
            target: Identifier::new(5),
            hops: max_hops + 1,
        })
    );
    assert_eq!(
        hub.deliveries(&a.address(), "resolve_successor")
            + hub.deliveries(&b.address(), "resolve_successor"),
        max_hops as usize + 1
    );

    // the failure came from deeper in the chain, so b stays in a's routing state
    assert_eq!(a.successor_list(), vec![b.identity()]);
    assert_eq!(a.fingers(), vec![(0, b.identity())]);

    // a request that arrives over the bound fails without being forwarded
    assert!(matches!(
        a.resolve_successor(Identifier::new(5), max_hops + 1),
        Err(ChordError::LookupExceededHops { .. })
    ));
}

/// Errors raised further down a lookup chain reach the caller unchanged and do not evict the
/// healthy next hop.
#[test]
fn test_remote_failure_is_not_blamed_on_next_hop() {
    let ring = Ring::new(100).unwrap();
    let hub = NetworkHub::new();
    let a = mock_node(&hub, ring, 10);
    let b = mock_node(&hub, ring, 40);

    // every candidate b knows of for position 5 is gone
    a.successors.reset_to(b.identity());
    a.fingers.update_entry(b.identity(), 0).unwrap();
    b.successors.reset_to(identity_at(45));
    for (index, ghost) in [(3, 80), (4, 85), (5, 90), (6, 95)] {
        b.fingers.update_entry(identity_at(ghost), index).unwrap();
    }

    match a.find_successor(Identifier::new(5)) {
        Err(ChordError::PeerUnreachable { address, .. }) => {
            assert_eq!(address, identity_at(80).address())
        }
        other => panic!("expected the last ghost to be reported, got {:?}", other),
    }
    assert_eq!(a.successor_list(), vec![b.identity()]);
    assert_eq!(a.fingers(), vec![(0, b.identity())]);
    assert!(b.fingers().is_empty());
}

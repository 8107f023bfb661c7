mod test_imports {
    pub use crate::core::testutil::random::bytes;
    pub use crate::core::{Address, Identifier, Identity, Ring};
    pub use crate::network::mock::NetworkHub;
    pub use crate::node::{ChordNode, Node, NodeOptions};
    pub use rand::Rng;
}

use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;
use test_imports::*;
use tracing::Span;

static TRACING: Once = Once::new();

/// Returns a span to parent test components under. The first call installs a test-writer
/// subscriber at WARN so recovered peer failures show up in failing test output.
pub fn span_fixture() -> Span {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::WARN)
            .try_init();
    });
    tracing::span!(tracing::Level::TRACE, "test_span")
}

/// Generate a random identifier on a ring of 2^63 positions.
pub fn random_identifier() -> Identifier {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes(8));
    Identifier::new(u64::from_be_bytes(raw) >> 1)
}

/// Generate a random port.
pub fn random_port() -> u16 {
    rand::rng().random_range(1024..=65535)
}

/// Generate a random address
pub fn random_address() -> Address {
    Address::new("localhost", &random_port().to_string())
}

/// Generate a random identity; ID and Address.
pub fn random_identity() -> Identity {
    Identity::new(random_identifier(), random_address())
}

/// A deterministic identity at ring position `id`, with an address derived from the position.
pub fn identity_at(id: u64) -> Identity {
    Identity::new(Identifier::new(id), Address::new(&format!("node-{}", id), "8081"))
}

/// Creates a node at position `id` on its own mock network in `hub`. The node is not joined.
pub fn mock_node(hub: &Arc<NetworkHub>, ring: Ring, id: u64) -> ChordNode {
    let identity = identity_at(id);
    let net = NetworkHub::new_mock_network(hub, identity.address())
        .expect("failed to create mock network");
    ChordNode::new(
        &span_fixture(),
        identity,
        ring,
        NodeOptions::for_ring(&ring),
        Box::new(net),
    )
    .expect("failed to create node")
}

/// Builds a ring over the mock network: the first node seeds it and every later node joins
/// through the first one. After each join, every node that has joined so far runs `rounds`
/// stabilization rounds.
pub fn mock_ring(hub: &Arc<NetworkHub>, ring: Ring, ids: &[u64], rounds: usize) -> Vec<ChordNode> {
    let mut nodes: Vec<ChordNode> = Vec::with_capacity(ids.len());
    for id in ids {
        let node = mock_node(hub, ring, *id);
        let introducer = nodes.first().map(|first| first.identity());
        node.join(introducer).expect("join failed");
        nodes.push(node);
        stabilize_rounds(&nodes, rounds);
    }
    nodes
}

/// Runs `rounds` rounds of stabilize followed by a full finger refresh on every node.
pub fn stabilize_rounds(nodes: &[ChordNode], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes {
            node.stabilize().expect("stabilize failed");
        }
        for node in nodes {
            node.fix_all_fingers().expect("fix fingers failed");
        }
    }
}

/// The member responsible for `id` among nodes at the given positions: the first position at or
/// after `id`, wrapping to the smallest one.
pub fn true_successor(ids: &[u64], id: u64) -> u64 {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .copied()
        .find(|candidate| *candidate >= id)
        .unwrap_or(sorted[0])
}

/// Lists every way in which the nodes differ from an ideal ring: each node's successor list is
/// the next members clockwise, its predecessor is the previous member, and every finger points
/// at the true successor of its start. Returns an empty list for a converged ring.
pub fn ring_violations(nodes: &[ChordNode], ring: Ring) -> Vec<String> {
    let mut sorted: Vec<&ChordNode> = nodes.iter().collect();
    sorted.sort_by_key(|node| node.identity().id());
    let ids: Vec<u64> = sorted.iter().map(|node| node.identity().id().value()).collect();
    let n = sorted.len();
    let mut violations = Vec::new();

    for (i, node) in sorted.iter().enumerate() {
        let me = node.identity();
        let expected_successors: Vec<Identity> = if n == 1 {
            vec![me; node.options().successor_list_len]
        } else {
            (1..n)
                .map(|k| sorted[(i + k) % n].identity())
                .take(node.options().successor_list_len)
                .collect()
        };
        if node.successor_list() != expected_successors {
            violations.push(format!(
                "{}: successors {:?}, expected {:?}",
                me,
                node.successor_list(),
                expected_successors
            ));
        }

        let expected_predecessor = if n == 1 {
            None
        } else {
            Some(sorted[(i + n - 1) % n].identity())
        };
        if node.predecessor() != expected_predecessor {
            violations.push(format!(
                "{}: predecessor {:?}, expected {:?}",
                me,
                node.predecessor(),
                expected_predecessor
            ));
        }

        let fingers = node.fingers();
        for index in 0..ring.finger_count() {
            let start = ring.finger_start(me.id(), index);
            let expected = true_successor(&ids, start.value());
            let actual = fingers
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, finger)| finger.id().value());
            if actual != Some(expected) {
                violations.push(format!(
                    "{}: finger {} is {:?}, expected {}",
                    me, index, actual, expected
                ));
            }
        }
    }
    violations
}

pub fn ring_converged(nodes: &[ChordNode], ring: Ring) -> bool {
    ring_violations(nodes, ring).is_empty()
}

pub fn assert_converged(nodes: &[ChordNode], ring: Ring) {
    let violations = ring_violations(nodes, ring);
    assert!(violations.is_empty(), "ring did not converge:\n{}", violations.join("\n"));
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(mut condition: F, timeout: Duration) -> Result<(), String>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("condition not met within {:?}", timeout));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Joins all threads in the given handles with a timeout.
/// If any thread takes longer than the timeout, it will return an error.
/// If all threads finish within the timeout, it will return Ok(()).
/// Arguments:
/// * handles: A vector of JoinHandle<T> to join.
/// * timeout: The maximum time to wait for all threads to finish.
/// Returns:
/// * Ok(()) if all threads finish within the timeout.
/// * Err(String) if any thread takes longer than the timeout or panics.
pub fn join_all_with_timeout<T>(
    handles: Box<[JoinHandle<T>]>,
    timeout: Duration,
) -> Result<(), String>
where
    T: Send + 'static,
{
    let start = std::time::Instant::now();

    for handle in handles {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err("Timeout".to_string());
        }

        // Remaining time to wait for this thread to finish
        join_with_timeout(handle, timeout - elapsed)?;
    }

    Ok(())
}

/// Helper function to join a thread with a timeout using a simple trick:
/// 1. Spawn a new thread that will join the target thread.
/// 2. Use a channel to send the result of the join back to the main thread.
/// 3. If the join takes too long, the main thread will timeout and return an error.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Result<(), String>
where
    T: Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();

    // Spawn a thread just to join the target thread and send its result via channel
    let join_thread = std::thread::spawn(move || {
        let res = handle.join();
        let _ = tx.send(res);
    });

    if let Ok(join_res) = rx.recv_timeout(timeout) {
        join_thread.join().expect("Failed to join thread");
        match join_res {
            Ok(_) => Ok(()),
            Err(e) => Err(format!("Thread panicked: {:?}", e)),
        }
    } else {
        Err("Thread timed out".to_string())
    }
}

mod test {
    use super::*;

    #[test]
    fn test_true_successor_wraps() {
        let ids = [40, 10, 70];
        assert_eq!(true_successor(&ids, 55), 70);
        assert_eq!(true_successor(&ids, 40), 40);
        assert_eq!(true_successor(&ids, 71), 10);
        assert_eq!(true_successor(&ids, 0), 10);
    }

    #[test]
    fn test_random_identities_are_distinct() {
        let a = random_identity();
        let b = random_identity();
        assert!(a.id() != b.id() || a.address() != b.address());
    }
}

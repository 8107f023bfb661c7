//! Finding a way into an existing ring.
//!
//! A [`Discovery`] produces candidate members to join through; [`bootstrap`] tries them in
//! order and seeds a new ring when none of them admits the node.

use crate::core::{Address, Identity};
use crate::network::Network;
use crate::node::{ChordNode, Node, RemotePeer};
use anyhow::anyhow;
use std::time::Duration;
use tracing::Span;

/// The outcome of discovery: where this node is reachable and whom it may join through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    pub self_address: Address,
    pub candidates: Vec<Address>,
}

pub trait Discovery: Send + Sync {
    fn discover(&self) -> anyhow::Result<Bootstrap>;
}

/// Candidates are a fixed, configured list of seeds.
pub struct StaticDiscovery {
    self_address: Address,
    seeds: Vec<Address>,
}

impl StaticDiscovery {
    pub fn new(self_address: Address, seeds: Vec<Address>) -> StaticDiscovery {
        StaticDiscovery {
            self_address,
            seeds,
        }
    }
}

impl Discovery for StaticDiscovery {
    fn discover(&self) -> anyhow::Result<Bootstrap> {
        Ok(Bootstrap {
            self_address: self.self_address,
            candidates: self
                .seeds
                .iter()
                .copied()
                .filter(|seed| *seed != self.self_address)
                .collect(),
        })
    }
}

/// Pings every seed in parallel and keeps those that answer, in their configured order.
pub struct PingDiscovery {
    net: Box<dyn Network>,
    seeds: Vec<Address>,
    timeout: Duration,
    span: Span,
}

impl PingDiscovery {
    pub fn new(
        parent_span: &Span,
        net: Box<dyn Network>,
        seeds: Vec<Address>,
        timeout: Duration,
    ) -> PingDiscovery {
        let span = tracing::span!(parent: parent_span, tracing::Level::TRACE, "ping_discovery");
        PingDiscovery {
            net,
            seeds,
            timeout,
            span,
        }
    }
}

impl Discovery for PingDiscovery {
    fn discover(&self) -> anyhow::Result<Bootstrap> {
        let _enter = self.span.enter();
        let self_address = self.net.local_address();

        let alive: Vec<bool> = std::thread::scope(|scope| {
            let pings: Vec<_> = self
                .seeds
                .iter()
                .map(|seed| {
                    let peer =
                        RemotePeer::new(&self.span, self.net.clone(), *seed, self.timeout, 0);
                    scope.spawn(move || *seed != self_address && peer.ping().is_ok())
                })
                .collect();
            pings
                .into_iter()
                .map(|ping| ping.join().unwrap_or(false))
                .collect()
        });

        let candidates: Vec<Address> = self
            .seeds
            .iter()
            .zip(alive)
            .filter_map(|(seed, alive)| alive.then_some(*seed))
            .collect();
        tracing::debug!("{} of {} seeds answered", candidates.len(), self.seeds.len());

        Ok(Bootstrap {
            self_address,
            candidates,
        })
    }
}

/// Joins the ring through the first candidate that admits `node`, or seeds a new ring when there
/// is no candidate or all of them fail. Returns the introducer that was used, if any.
///
/// Fails without joining when discovery places this node at an address other than the one its
/// identity was derived from, since peers would then reach it under the wrong ring position.
pub fn bootstrap(node: &ChordNode, discovery: &dyn Discovery) -> anyhow::Result<Option<Identity>> {
    let found = discovery.discover()?;
    if found.self_address != node.address() {
        return Err(anyhow!(
            "discovery reports this node at {} but it is known to the ring as {}",
            found.self_address,
            node.address()
        ));
    }
    let ring = node.ring();

    for candidate in found.candidates.iter().filter(|c| **c != found.self_address) {
        let introducer = Identity::from_address(&ring, *candidate);
        match node.join(Some(introducer)) {
            Ok(()) => {
                tracing::info!("{} joined the ring through {}", node.identity(), candidate);
                return Ok(Some(introducer));
            }
            Err(e) => tracing::warn!("could not join through {}: {}", candidate, e),
        }
    }

    if !found.candidates.is_empty() {
        tracing::warn!("no seed admitted {}; starting a new ring", node.identity());
    }
    node.join(None)?;
    tracing::info!("{} started a new ring", node.identity());
    Ok(None)
}

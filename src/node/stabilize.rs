use crate::core::{Address, Identity};
use crate::error::ChordError;
use crate::node::{ChordNode, Node};
use std::collections::HashSet;
use std::sync::atomic::Ordering;

impl ChordNode {
    /// Verifies the immediate successor and tells it about this node.
    ///
    /// Adopts the successor's predecessor when it sits between the two, notifies the (possibly
    /// new) successor, and rebuilds the successor list from the successor's own list. A successor
    /// that does not answer is dropped and the next one in the list takes its place. When no
    /// successor is left the node falls back to a singleton ring and reports `RingIsolated`.
    pub fn stabilize(&self) -> Result<(), ChordError> {
        let _enter = self.span.enter();
        let mut failed: HashSet<Address> = HashSet::new();

        loop {
            let successor = match self.successors.first() {
                Some(successor) => successor,
                None => {
                    tracing::error!("no live successor left, falling back to a singleton ring");
                    self.seed();
                    return Err(ChordError::RingIsolated(self.address()));
                }
            };

            match self.stabilize_with(successor, &failed) {
                Ok(()) => return Ok(()),
                Err(ChordError::PeerUnreachable { address, reason }) => {
                    tracing::warn!(
                        "dropping unreachable peer {} during stabilize: {}",
                        address,
                        reason
                    );
                    self.forget(&address);
                    failed.insert(address);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn stabilize_with(
        &self,
        successor: Identity,
        failed: &HashSet<Address>,
    ) -> Result<(), ChordError> {
        let mut successor = successor;
        if let Some(candidate) = self.predecessor_of(successor)? {
            if !failed.contains(&candidate.address())
                && self
                    .ring
                    .in_open_interval(candidate.id(), self.identity.id(), successor.id())
            {
                tracing::debug!("adopting {} as successor in place of {}", candidate, successor);
                self.successors.push_front(candidate);
                successor = candidate;
            }
        }

        self.notify_at(successor)?;
        let remote = self.successor_list_of(successor)?;
        self.successors.reconcile(successor, &remote);

        if let Err(e) = self.fingers.update_entry(successor, 0) {
            tracing::warn!("could not record first finger: {}", e);
        }
        Ok(())
    }

    /// Handles a claim by `candidate` to be this node's predecessor. The claim is accepted when no
    /// predecessor is known or the candidate lies between the current predecessor and this node.
    pub fn notify(&self, candidate: Identity) {
        if candidate == self.identity {
            return;
        }
        let mut predecessor = self.predecessor.write();
        let accept = match *predecessor {
            None => true,
            Some(current) => self
                .ring
                .in_open_interval(candidate.id(), current.id(), self.identity.id()),
        };
        if accept {
            let _enter = self.span.enter();
            tracing::debug!("predecessor changed from {:?} to {}", *predecessor, candidate);
            *predecessor = Some(candidate);
        }
    }

    /// Refreshes the next finger in round-robin order.
    pub fn fix_fingers(&self) -> Result<(), ChordError> {
        let size = self.fingers.size();
        let index = self.next_finger.fetch_add(1, Ordering::Relaxed) % size;
        self.fix_finger(index)
    }

    /// Refreshes every finger, lowest index first.
    pub fn fix_all_fingers(&self) -> Result<(), ChordError> {
        (0..self.fingers.size()).try_for_each(|index| self.fix_finger(index))
    }

    fn fix_finger(&self, index: usize) -> Result<(), ChordError> {
        let start = self.ring.finger_start(self.identity.id(), index);
        let found = self.find_successor(start)?;

        let _enter = self.span.enter();
        if let Err(e) = self.fingers.update_entry(found, index) {
            tracing::warn!("could not update finger {}: {}", index, e);
        }
        tracing::trace!("finger {} (start {}) is {}", index, start, found);
        Ok(())
    }

    /// Clears the predecessor if it does not answer a ping.
    pub fn check_predecessor(&self) -> Result<(), ChordError> {
        let predecessor = match self.predecessor() {
            Some(predecessor) if predecessor != self.identity => predecessor,
            _ => return Ok(()),
        };

        match self.peer(predecessor.address()).ping() {
            Ok(()) => Ok(()),
            Err(ChordError::PeerUnreachable { reason, .. }) => {
                let _enter = self.span.enter();
                tracing::warn!("predecessor {} is unreachable: {}", predecessor, reason);
                let mut current = self.predecessor.write();
                if *current == Some(predecessor) {
                    *current = None;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drops the immediate successor if it does not answer a ping.
    pub fn check_successor(&self) -> Result<(), ChordError> {
        let successor = self.successor();
        if successor == self.identity {
            return Ok(());
        }
        match self.peer(successor.address()).ping() {
            Ok(()) => Ok(()),
            Err(ChordError::PeerUnreachable { address, reason }) => {
                let _enter = self.span.enter();
                tracing::warn!("successor {} is unreachable: {}", successor, reason);
                self.forget(&address);
                if self.successors.is_empty() {
                    tracing::error!("no live successor left, falling back to a singleton ring");
                    self.seed();
                    return Err(ChordError::RingIsolated(self.address()));
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn predecessor_of(&self, member: Identity) -> Result<Option<Identity>, ChordError> {
        if member == self.identity {
            return Ok(self.predecessor());
        }
        self.peer(member.address()).predecessor()
    }

    fn notify_at(&self, member: Identity) -> Result<(), ChordError> {
        if member == self.identity {
            return Ok(());
        }
        self.peer(member.address()).notify(self.identity)
    }

    fn successor_list_of(&self, member: Identity) -> Result<Vec<Identity>, ChordError> {
        if member == self.identity {
            return Ok(self.successor_list());
        }
        self.peer(member.address()).successor_list()
    }
}
